use opencode::SessionEvent;
use regex::Regex;
use std::collections::HashSet;

/// Verdict of a judge session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewVerdict {
    Approved,
    ChangesRequested(String),
}

pub struct MessageParser;

impl MessageParser {
    /// Rebuild the assistant's text output for one session from its events.
    ///
    /// Text parts stream as repeated `message.part.updated` events carrying the
    /// full text so far, so the last version of each part wins. Parts keep the
    /// order in which they first appeared. Parts of user messages (the prompt
    /// echoed back) are skipped.
    pub fn transcript(events: &[SessionEvent], session_id: &str) -> String {
        let own = move || events.iter().filter(move |e| e.belongs_to(session_id));

        let user_messages: HashSet<&str> = own()
            .filter(|e| e.event_type == "message.updated")
            .filter_map(|e| {
                let info = e.properties.get("info")?;
                (info.get("role")?.as_str()? == "user").then_some(info.get("id")?.as_str()?)
            })
            .collect();

        let mut order: Vec<&str> = Vec::new();
        let mut texts: Vec<&str> = Vec::new();

        for event in own().filter(|e| e.event_type == "message.part.updated") {
            let Some(part) = event.properties.get("part") else {
                continue;
            };
            if part.get("type").and_then(|v| v.as_str()) != Some("text") {
                continue;
            }
            let message_id = part.get("messageID").and_then(|v| v.as_str());
            if message_id.is_some_and(|id| user_messages.contains(id)) {
                continue;
            }
            let (Some(id), Some(text)) = (
                part.get("id").and_then(|v| v.as_str()),
                part.get("text").and_then(|v| v.as_str()),
            ) else {
                continue;
            };

            match order.iter().position(|known| *known == id) {
                Some(index) => texts[index] = text,
                None => {
                    order.push(id);
                    texts.push(text);
                }
            }
        }

        texts
            .into_iter()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn parse_review_response(content: &str) -> ReviewVerdict {
        let content_upper = content.to_uppercase();

        let changes_requested = content_upper.contains("CHANGES_REQUESTED")
            || content_upper.contains("CHANGES REQUESTED");

        if !changes_requested
            && content_upper.contains("APPROVED")
            && !content_upper.contains("NOT APPROVED")
        {
            return ReviewVerdict::Approved;
        }

        if !changes_requested {
            return ReviewVerdict::ChangesRequested(
                "Review response unclear. Re-check the implementation against the task."
                    .to_string(),
            );
        }

        let feedback = content
            .lines()
            .skip_while(|line| {
                let upper = line.to_uppercase();
                !upper.contains("CHANGES_REQUESTED") && !upper.contains("CHANGES REQUESTED")
            })
            .skip(1)
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();

        if feedback.is_empty() {
            ReviewVerdict::ChangesRequested(content.trim().to_string())
        } else {
            ReviewVerdict::ChangesRequested(feedback)
        }
    }

    /// Parse the last `STORIES: <completed>/<total>` line of a development report.
    pub fn parse_stories(content: &str) -> Option<(u32, u32)> {
        let re = Regex::new(r"(?mi)^[\s*_#-]*STORIES[\s*_]*:[\s*_]*(\d+)\s*/\s*(\d+)").ok()?;
        let captures = re.captures_iter(content).last()?;
        let completed = captures.get(1)?.as_str().parse().ok()?;
        let total = captures.get(2)?.as_str().parse().ok()?;
        Some((completed, total))
    }
}
