use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One chat turn sent to or received from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Split `<think>...</think>` blocks out of a completion.
///
/// Local reasoning models served through OpenAI-compatible endpoints often
/// inline their reasoning ahead of the answer, which breaks the JSON
/// contracts of the query and reflection stages. Returns the remaining
/// content and the extracted reasoning, if any. An unterminated block is
/// treated as reasoning up to the end of the text.
pub fn strip_thinking_tags(content: &str) -> (String, Option<String>) {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    let mut clean = String::with_capacity(content.len());
    let mut thinking: Vec<&str> = Vec::new();
    let mut rest = content;

    while let Some(start) = rest.find(OPEN) {
        clean.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        match after_open.find(CLOSE) {
            Some(end) => {
                thinking.push(after_open[..end].trim());
                rest = &after_open[end + CLOSE.len()..];
            }
            None => {
                thinking.push(after_open.trim());
                rest = "";
            }
        }
    }
    clean.push_str(rest);

    if thinking.is_empty() {
        (content.to_string(), None)
    } else {
        (clean.trim().to_string(), Some(thinking.join("\n")))
    }
}
