//! Prompt templates for the research stages.

/// System prompt for CreateQuery.
pub fn query_prompt(date: &str, topic: &str) -> String {
    format!(
        r#"Your goal is to write one targeted web search query.

<CONTEXT>
Current date: {date}
Favour queries that surface the most recent information available as of this date.
</CONTEXT>

<TOPIC>
{topic}
</TOPIC>

<FORMAT>
Respond with a JSON object that has exactly these keys:
   - "query": the search query string
   - "rationale": one sentence on why this query is relevant
</FORMAT>

<EXAMPLE>
{{
    "query": "transformer attention mechanism explained",
    "rationale": "Attention is the building block every transformer variant shares"
}}
</EXAMPLE>

Respond with the JSON object only."#
    )
}

/// System prompt for Summarize.
pub fn summarizer_prompt(topic: &str) -> String {
    format!(
        r#"<GOAL>
Write a high-quality summary of the provided context for this topic:
- {topic}
</GOAL>

<REQUIREMENTS>
1. Keep the information most relevant to the topic.
2. Make the summary read as one coherent piece.
3. Do not add a preamble, a title or a conclusion section.
4. Do not use XML tags in the output.
</REQUIREMENTS>

Read the context carefully first, then write the summary."#
    )
}

/// System prompt for Reflect. `topics` is every topic explored so far.
pub fn reflection_prompt(topics: &[String]) -> String {
    let explored = topics
        .iter()
        .map(|t| format!("- {}", t))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are an expert research assistant reviewing a summary. Topics explored so far:
{explored}

<GOAL>
1. Find knowledge gaps or areas that need deeper exploration.
2. Write one follow-up question that would close the most important gap.
3. Prefer technical details, implementation specifics and emerging trends the summary does not cover.
</GOAL>

<REQUIREMENTS>
The follow-up question must be self-contained and usable as a web search on its own.
Do not repeat a topic that was already explored.
If the research is complete and no meaningful gap remains, set "follow_up_query" to an empty string.
</REQUIREMENTS>

<FORMAT>
Respond with a JSON object that has exactly these keys:
- "knowledge_gap": what information is missing or unclear
- "follow_up_query": the follow-up question, or "" when there is no gap
</FORMAT>

<EXAMPLE>
{{
    "knowledge_gap": "The summary does not cover performance benchmarks",
    "follow_up_query": "What benchmarks are used to evaluate surface code decoders?"
}}
</EXAMPLE>

Respond with the JSON object only."#
    )
}

/// Follow-up user message sent when the model's answer was not valid JSON.
pub fn corrective_prompt(error: &str) -> String {
    format!(
        "Your previous reply could not be parsed as JSON ({error}). \
         Reply again with only the JSON object in the requested format, \
         without code fences or commentary."
    )
}
