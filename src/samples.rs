// Content Sample Library
// Static sample bodies per content family and the classifier that picks a family
// from the latest message. The classifier is shared by the plain completion
// handler and the streaming emulator so both choose the same family.

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Family of sample content a response is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Markdown,
    Html,
    Json,
    Text,
}

impl ContentType {
    pub const ALL: [ContentType; 4] = [
        ContentType::Markdown,
        ContentType::Html,
        ContentType::Json,
        ContentType::Text,
    ];

    /// Classify by case-insensitive substring, checked in order:
    /// "markdown"/"md", then "html", then "json"; anything else is text.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("markdown") || lower.contains("md") {
            ContentType::Markdown
        } else if lower.contains("html") {
            ContentType::Html
        } else if lower.contains("json") {
            ContentType::Json
        } else {
            ContentType::Text
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Markdown => "markdown",
            ContentType::Html => "html",
            ContentType::Json => "json",
            ContentType::Text => "text",
        }
    }

    /// The sample pool for this family
    pub fn samples(&self) -> &'static [&'static str] {
        match self {
            ContentType::Markdown => MARKDOWN_SAMPLES,
            ContentType::Html => HTML_SAMPLES,
            ContentType::Json => JSON_SAMPLES,
            ContentType::Text => TEXT_SAMPLES,
        }
    }

    /// Draw one sample from this family's pool
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &'static str {
        self.samples().choose(rng).copied().unwrap_or_default()
    }

    /// Whether `content` is one of this family's samples
    pub fn contains(&self, content: &str) -> bool {
        self.samples().contains(&content)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const MARKDOWN_SAMPLES: &[&str] = &[
    "# Project Overview\n\nHere is a quick summary:\n\n- **Goal**: ship the beta by Friday\n- **Owner**: platform team\n- **Status**: on track\n\n```rust\nfn main() {\n    println!(\"hello\");\n}\n```\n\n> Keep the scope small and iterate.",
    "## Steps to Reproduce\n\n1. Open the settings page\n2. Toggle *dark mode*\n3. Refresh the browser\n\n| Browser | Result |\n|---------|--------|\n| Firefox | works  |\n| Safari  | fails  |\n\nSee the [issue tracker](https://example.com/issues) for details.",
    "### Release Notes\n\n**Added**\n- Streaming responses\n- Retry with backoff\n\n**Fixed**\n- Crash when the message list is empty\n\n`v1.4.2` is now available on the stable channel.",
];

const HTML_SAMPLES: &[&str] = &[
    "<div class=\"card\">\n  <h2>Welcome back</h2>\n  <p>You have <strong>3</strong> unread messages.</p>\n  <a href=\"/inbox\" class=\"button\">Open inbox</a>\n</div>",
    "<ul class=\"features\">\n  <li>Fast startup</li>\n  <li>Small memory footprint</li>\n  <li>First-class <em>streaming</em> support</li>\n</ul>\n<p>Learn more in the <a href=\"/docs\">documentation</a>.</p>",
    "<table>\n  <thead><tr><th>Plan</th><th>Price</th></tr></thead>\n  <tbody>\n    <tr><td>Starter</td><td>$9</td></tr>\n    <tr><td>Team</td><td>$29</td></tr>\n  </tbody>\n</table>",
];

const JSON_SAMPLES: &[&str] = &[
    "{\n  \"status\": \"success\",\n  \"data\": {\n    \"id\": 1024,\n    \"name\": \"Example Item\",\n    \"tags\": [\"alpha\", \"beta\"],\n    \"active\": true\n  }\n}",
    "{\n  \"users\": [\n    {\"id\": 1, \"name\": \"Ada\", \"role\": \"admin\"},\n    {\"id\": 2, \"name\": \"Grace\", \"role\": \"editor\"}\n  ],\n  \"total\": 2\n}",
    "{\n  \"weather\": {\n    \"location\": \"Lisbon\",\n    \"temperature\": 21.5,\n    \"unit\": \"celsius\",\n    \"forecast\": [\"sunny\", \"cloudy\", \"rain\"]\n  }\n}",
];

const TEXT_SAMPLES: &[&str] = &[
    "Thanks for your question! The short answer is yes: you can run the service locally without network access. Start it with the default settings, point your client at the local address, and every request will be answered immediately.",
    "That is a great idea. Breaking the work into smaller steps usually makes it easier to test each part on its own, and it keeps reviews short enough that feedback arrives while the context is still fresh.",
    "Here is a brief explanation. A cache stores the results of expensive operations so that repeated requests can be served quickly. The trade-off is memory usage and the need to decide when stored entries become stale.",
    "I understand. Let me summarize what we discussed: the deployment is scheduled for next week, the database migration runs first, and the rollback plan has been reviewed by the operations team.",
];

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_classify_order() {
        assert_eq!(
            ContentType::classify("Write me some MARKDOWN"),
            ContentType::Markdown
        );
        assert_eq!(ContentType::classify("readme.md please"), ContentType::Markdown);
        assert_eq!(ContentType::classify("an html page"), ContentType::Html);
        assert_eq!(ContentType::classify("Return JSON"), ContentType::Json);
        assert_eq!(ContentType::classify("hello there"), ContentType::Text);
        // markdown wins over the later checks
        assert_eq!(
            ContentType::classify("convert html to markdown"),
            ContentType::Markdown
        );
        assert_eq!(ContentType::classify("html or json"), ContentType::Html);
    }

    #[test]
    fn test_pick_comes_from_pool() {
        let mut rng = StdRng::seed_from_u64(7);
        for content_type in ContentType::ALL {
            for _ in 0..20 {
                let sample = content_type.pick(&mut rng);
                assert!(content_type.contains(sample));
            }
        }
    }

    #[test]
    fn test_pools_are_disjoint_and_non_empty() {
        for a in ContentType::ALL {
            assert!(!a.samples().is_empty());
            for b in ContentType::ALL {
                if a != b {
                    assert!(a.samples().iter().all(|s| !b.contains(s)));
                }
            }
        }
    }

    #[test]
    fn test_samples_fit_under_stream_cap() {
        for content_type in ContentType::ALL {
            for sample in content_type.samples() {
                assert!(sample.chars().count() < crate::stream::MAX_STREAM_CHUNKS);
            }
        }
    }

    #[test]
    fn test_json_samples_parse() {
        for sample in ContentType::Json.samples() {
            assert!(serde_json::from_str::<serde_json::Value>(sample).is_ok());
        }
    }
}
