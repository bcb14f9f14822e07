//! Lenient reader for the report + slide outline the generation prompt asks
//! for. Models do not always follow the requested layout, so nothing here
//! fails: text without slide headings is treated as report body.

use crate::prompt::SLIDE_COUNT;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static SLIDE_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*#{1,6}\s*(?:슬라이드|[Ss]lide)\s*(\d+)\s*[:：.\-]?\s*(.*)$")
        .expect("valid slide heading pattern")
});
static NOTES_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\**\s*(?:발표자\s*노트|[Ss]peaker\s+[Nn]otes)\s*\**\s*[:：]\s*\**\s*(.*)$")
        .expect("valid notes pattern")
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slide {
    pub number: usize,
    pub title: String,
    pub bullets: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub report: String,
    pub slides: Vec<Slide>,
}

impl Artifact {
    pub fn parse(text: &str) -> Self {
        let mut report = Vec::new();
        let mut slides: Vec<Slide> = Vec::new();
        let mut in_notes = false;

        for line in text.lines() {
            if let Some(caps) = SLIDE_HEADING.captures(line) {
                slides.push(Slide {
                    number: caps[1].parse().unwrap_or(slides.len() + 1),
                    title: caps[2].trim().to_string(),
                    ..Slide::default()
                });
                in_notes = false;
                continue;
            }
            let Some(slide) = slides.last_mut() else {
                report.push(line);
                continue;
            };
            if let Some(caps) = NOTES_PREFIX.captures(line) {
                slide.notes = Some(caps[1].trim().to_string());
                in_notes = true;
                continue;
            }
            let trimmed = line.trim();
            if let Some(bullet) = bullet_text(trimmed) {
                slide.bullets.push(bullet.to_string());
                in_notes = false;
            } else if in_notes && !trimmed.is_empty() && !is_rule(trimmed) {
                let notes = slide.notes.get_or_insert_with(String::new);
                if !notes.is_empty() {
                    notes.push(' ');
                }
                notes.push_str(trimmed);
            }
        }

        Self {
            report: report.join("\n").trim().to_string(),
            slides,
        }
    }

    /// True when the model returned exactly the requested number of slides.
    pub fn is_complete(&self) -> bool {
        self.slides.len() == SLIDE_COUNT
    }
}

fn bullet_text(line: &str) -> Option<&str> {
    line.strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("• "))
        .map(str::trim)
}

fn is_rule(line: &str) -> bool {
    line.len() >= 3 && line.chars().all(|c| c == '-' || c == '*' || c == '_')
}
