//! Content extraction for fetched pages.
//!
//! Pages are cleaned in three passes: noise elements (scripts, navigation,
//! ads, social widgets) are detached, then every element left without any
//! text, and finally the first content container is picked, falling back
//! to `<body>`. The chosen markup is rendered to markdown-like text.

use std::io::Cursor;

use scraper::{ElementRef, Html, Selector};

const NOISE_SELECTORS: &str = "script, style, noscript, iframe, embed, object, \
     nav, header, footer, aside, .nav, .navigation, .menu, .sidebar, \
     .ad, .ads, .advertisement, .social, .share, .comments";

const CONTENT_SELECTORS: &str = "article, main, .article, .content, .post, .entry";

/// Elements that are kept even when they carry no text.
const STRUCTURAL_TAGS: [&str; 3] = ["html", "head", "body"];

/// Wrap width handed to the markdown renderer.
const RENDER_WIDTH: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct ContentExtractor {
    /// Upper bound on the text kept per page, in chars.
    max_chars: usize,
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self {
            max_chars: 20_000,
        }
    }
}

impl ContentExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    /// Clean `html` and render the main content as text.
    ///
    /// Returns an empty string when nothing readable is left.
    pub fn extract(&self, html: &str) -> String {
        let cleaned = clean_html(html);
        if cleaned.trim().is_empty() {
            return String::new();
        }
        let text = clean_text(&self.to_markdown(&cleaned));
        truncate_chars(&text, self.max_chars)
    }

    fn to_markdown(&self, html: &str) -> String {
        html2text::from_read(Cursor::new(html.as_bytes()), RENDER_WIDTH).unwrap_or_else(|_| {
            Html::parse_fragment(html)
                .root_element()
                .text()
                .collect::<Vec<_>>()
                .join(" ")
        })
    }
}

/// Strip non-content markup and return the inner HTML of the main content.
pub fn clean_html(html: &str) -> String {
    let mut document = Html::parse_document(html);

    if let Ok(noise) = Selector::parse(NOISE_SELECTORS) {
        let ids: Vec<_> = document.select(&noise).map(|el| el.id()).collect();
        for id in ids {
            if let Some(mut node) = document.tree.get_mut(id) {
                node.detach();
            }
        }
    }

    let empty: Vec<_> = document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| !STRUCTURAL_TAGS.contains(&el.value().name()))
        .filter(|el| el.text().all(|t| t.trim().is_empty()))
        .map(|el| el.id())
        .collect();
    for id in empty {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    let content = Selector::parse(CONTENT_SELECTORS)
        .ok()
        .and_then(|sel| document.select(&sel).next());
    if let Some(content) = content {
        return content.inner_html();
    }

    Selector::parse("body")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .map(|body| body.inner_html())
        .unwrap_or_default()
}

/// Collapse runs of spaces inside lines and runs of blank lines.
fn clean_text(text: &str) -> String {
    let mut result = String::new();
    let mut blank_run = 0;

    for line in text.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run == 1 {
                result.push('\n');
            }
            continue;
        }
        blank_run = 0;

        let body = line.trim_start();
        result.push_str(&line[..line.len() - body.len()]);
        result.push_str(&body.split_whitespace().collect::<Vec<_>>().join(" "));
        result.push('\n');
    }

    result.trim().to_string()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!(
            "{}\n\n... (truncated, {} total characters)",
            &text[..cut],
            text.chars().count()
        ),
        None => text.to_string(),
    }
}
