//! Candidate memories from a conversational turn.
//!
//! A completion call reads one exchange and proposes short facts about the
//! user plus reflections on the assistant's side of it. Candidates are not
//! stored here; each still goes through the validator.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use reverie_config::ExtractionConfig;
use reverie_llm::{CompletionRequest, Message};
use reverie_memory::Category;

use crate::gateway::ExternalCalls;
use crate::parse::{clean_items, parse_json_reply};

/// A proposed memory and the category it would be filed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub content: String,
    pub category: Category,
}

impl Candidate {
    fn new(content: String, category: Category) -> Self {
        Self { content, category }
    }
}

#[derive(Debug, Deserialize)]
struct ExtractionReply {
    #[serde(default)]
    user_facts: Vec<String>,
    #[serde(default)]
    reflections: Vec<String>,
}

/// Proposes memories from conversation turns.
pub struct Extractor {
    gateway: Arc<ExternalCalls>,
    config: ExtractionConfig,
    persona: String,
}

impl Extractor {
    /// Create an extractor.
    pub fn new(gateway: Arc<ExternalCalls>, config: ExtractionConfig, persona: impl Into<String>) -> Self {
        Self {
            gateway,
            config,
            persona: persona.into(),
        }
    }

    /// Whether extraction is switched on.
    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Propose memories from one exchange. Failures yield no candidates.
    pub async fn extract(&self, user_text: &str, assistant_text: &str) -> Vec<Candidate> {
        if !self.config.enabled || user_text.trim().is_empty() {
            return Vec::new();
        }

        match self.gateway.complete(self.request(user_text, assistant_text)).await {
            Ok(reply) => {
                let candidates = parse_candidates(&reply, self.config.max_candidates);
                debug!(count = candidates.len(), "Extracted memory candidates");
                candidates
            }
            Err(e) => {
                warn!(error = %e, "Turn extraction failed");
                Vec::new()
            }
        }
    }

    fn request(&self, user_text: &str, assistant_text: &str) -> CompletionRequest {
        let persona = &self.persona;
        let system = format!(
            "You read one exchange between a user and {persona} and pick out what is worth \
             remembering long-term.\n\n\
             - user_facts: stable facts about the user (preferences, plans, struggles, \
             biography). Write each as a short third-person sentence.\n\
             - reflections: what {persona} learned or felt in this exchange, written in \
             first person.\n\n\
             Skip greetings, small talk and anything already obvious. Empty lists are fine.\n\
             Output JSON: {{\"user_facts\": [...], \"reflections\": [...]}}"
        );
        let turn = format!(
            "User: {}\n{}: {}",
            user_text.trim(),
            persona,
            assistant_text.trim()
        );
        CompletionRequest::new(vec![Message::user(turn)], 400)
            .with_system(system)
            .with_temperature(0.2)
            .with_json_response()
    }
}

/// Read `{"user_facts": [...], "reflections": [...]}` into at most `max`
/// candidates, user facts first.
pub fn parse_candidates(raw: &str, max: usize) -> Vec<Candidate> {
    let Some(reply) = parse_json_reply::<ExtractionReply>(raw, "extraction") else {
        return Vec::new();
    };

    clean_items(reply.user_facts)
        .into_iter()
        .map(|fact| Candidate::new(fact, Category::User))
        .chain(
            clean_items(reply.reflections)
                .into_iter()
                .map(|r| Candidate::new(r, Category::Reflection)),
        )
        .take(max)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reverie_llm::{MockBackend, MockEmbedder};

    fn make_extractor(backend: MockBackend, config: ExtractionConfig) -> (Extractor, Arc<MockBackend>) {
        let backend = Arc::new(backend);
        let gateway = Arc::new(ExternalCalls::new(
            Arc::new(MockEmbedder::new(8)),
            backend.clone(),
        ));
        (Extractor::new(gateway, config, "Juniper"), backend)
    }

    #[test]
    fn test_parse_candidates() {
        let raw = r#"```json
{"user_facts": ["Has an exam on Friday", " ", "has an exam on friday"], "reflections": ["I helped with revision"]}
```"#;
        let candidates = parse_candidates(raw, 6);
        assert_eq!(
            candidates,
            vec![
                Candidate::new("Has an exam on Friday".into(), Category::User),
                Candidate::new("I helped with revision".into(), Category::Reflection),
            ]
        );
    }

    #[test]
    fn test_parse_candidates_limits_and_failures() {
        let raw = r#"{"user_facts": ["a", "b", "c"], "reflections": ["d"]}"#;
        assert_eq!(parse_candidates(raw, 2).len(), 2);
        assert!(parse_candidates("no json here", 6).is_empty());
        assert!(parse_candidates(r#"{"user_facts": "not a list"}"#, 6).is_empty());
        assert!(parse_candidates("{}", 6).is_empty());
    }

    #[tokio::test]
    async fn test_extract_sends_turn() {
        let (extractor, backend) = make_extractor(
            MockBackend::with_text(r#"{"user_facts": ["Studies physics"], "reflections": []}"#),
            ExtractionConfig::default(),
        );
        let candidates = extractor
            .extract("I study physics", "That sounds fun!")
            .await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].category, Category::User);

        let request = &backend.requests()[0];
        assert_eq!(
            request.messages[0].content,
            "User: I study physics\nJuniper: That sounds fun!"
        );
    }

    #[tokio::test]
    async fn test_extract_disabled_or_failing() {
        let config = ExtractionConfig {
            enabled: false,
            ..Default::default()
        };
        let (extractor, backend) = make_extractor(MockBackend::with_text("{}"), config);
        assert!(extractor.extract("hello", "hi").await.is_empty());
        assert_eq!(backend.request_count(), 0);

        let (extractor, _) =
            make_extractor(MockBackend::failing("down"), ExtractionConfig::default());
        assert!(extractor.extract("hello", "hi").await.is_empty());
    }
}
