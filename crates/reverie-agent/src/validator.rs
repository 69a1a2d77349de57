//! Write-path policy check for candidate memories.
//!
//! A candidate first passes a local shape check, then (when enabled) a
//! completion call that either returns the text to store, possibly reworded,
//! or a `REJECTED: <reason>` marker. Any failure on the way is a rejection:
//! nothing is written unless the validator explicitly accepts it.

use std::sync::Arc;

use tracing::{debug, warn};

use reverie_config::ValidatorConfig;
use reverie_llm::{CompletionRequest, Message};
use reverie_memory::validation::validate_memory_content;

use crate::gateway::ExternalCalls;
use crate::parse::{strip_code_fences, strip_wrapping_quotes};

const REJECTION_MARKER: &str = "REJECTED";

/// Outcome of validating one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Store `text`. `rewritten` is set when it differs from the candidate.
    Accepted { text: String, rewritten: bool },
    /// Do not store anything.
    Rejected { reason: String },
}

impl Verdict {
    fn rejected(reason: impl Into<String>) -> Self {
        Verdict::Rejected {
            reason: reason.into(),
        }
    }

    /// Whether the candidate was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted { .. })
    }
}

/// Policy gate in front of every archive write.
pub struct Validator {
    gateway: Arc<ExternalCalls>,
    config: ValidatorConfig,
}

impl Validator {
    /// Create a validator.
    pub fn new(gateway: Arc<ExternalCalls>, config: ValidatorConfig) -> Self {
        Self { gateway, config }
    }

    /// The system instruction sent with every check.
    pub fn system_prompt(&self) -> String {
        let persona = &self.config.persona;
        let mut prompt = format!(
            "You are the memory validator for {persona}. Your job is to keep \
             {persona}'s long-term memory healthy, factual and growth-oriented.\n\n\
             Accept:\n\
             - Facts: user preferences, biographical details, specific events.\n\
             - Growth: significant shared moments or insights.\n\n\
             Reject:\n"
        );
        for rule in &self.config.rules {
            prompt.push_str(&format!("- {} ({})\n", rule.instruction, rule.name));
        }
        prompt.push_str(
            "\nOutput format:\n\
             - If valid, return the clean memory text only.\n\
             - If valid but the tone needs fixing, return the refined memory text only.\n\
             - If invalid, return \"REJECTED: <reason>\".",
        );
        prompt
    }

    /// Decide whether `content` may be stored, and in what form.
    pub async fn validate(&self, content: &str) -> Verdict {
        let candidate = content.trim();
        if let Err(e) = validate_memory_content(candidate) {
            debug!(error = %e, "Candidate failed local check");
            return Verdict::rejected(e.to_string());
        }

        if !self.config.enabled {
            return Verdict::Accepted {
                text: candidate.to_string(),
                rewritten: false,
            };
        }

        let request = CompletionRequest::new(
            vec![Message::user(format!("Proposed memory: {}", candidate))],
            self.config.max_tokens,
        )
        .with_system(self.system_prompt())
        .with_temperature(0.1);

        match self.gateway.complete(request).await {
            Ok(reply) => parse_verdict(candidate, &reply),
            Err(e) => {
                warn!(error = %e, "Validator call failed, rejecting candidate");
                Verdict::rejected(format!("validator unavailable: {}", e))
            }
        }
    }
}

/// The reason after a leading `REJECTED:` marker.
///
/// The marker must stand alone or be followed by `:` or `-`, so accepted
/// text that merely starts with the word ("Rejected by MIT...") is kept.
fn rejection_reason(text: &str) -> Option<&str> {
    let head = text.get(..REJECTION_MARKER.len())?;
    if !head.eq_ignore_ascii_case(REJECTION_MARKER) {
        return None;
    }
    let rest = text[REJECTION_MARKER.len()..].trim_start();
    if rest.is_empty() {
        return Some(rest);
    }
    rest.strip_prefix([':', '-']).map(str::trim)
}

/// Interpret a validator reply for `candidate`.
pub fn parse_verdict(candidate: &str, reply: &str) -> Verdict {
    let text = strip_wrapping_quotes(strip_code_fences(reply));
    if text.is_empty() {
        return Verdict::rejected("validator returned nothing");
    }

    if let Some(reason) = rejection_reason(text) {
        let reason = if reason.is_empty() {
            "no reason given"
        } else {
            reason
        };
        return Verdict::rejected(reason);
    }

    if let Err(e) = validate_memory_content(text) {
        return Verdict::rejected(format!("validator output unusable: {}", e));
    }

    Verdict::Accepted {
        rewritten: text != candidate.trim(),
        text: text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reverie_config::PolicyRule;
    use reverie_llm::{MockBackend, MockEmbedder};

    fn make_validator(backend: MockBackend, config: ValidatorConfig) -> (Validator, Arc<MockBackend>) {
        let backend = Arc::new(backend);
        let gateway = Arc::new(ExternalCalls::new(
            Arc::new(MockEmbedder::new(8)),
            backend.clone(),
        ));
        (Validator::new(gateway, config), backend)
    }

    #[test]
    fn test_parse_verdict_accept_and_rewrite() {
        assert_eq!(
            parse_verdict("Likes tea", "Likes tea"),
            Verdict::Accepted {
                text: "Likes tea".into(),
                rewritten: false
            }
        );
        assert_eq!(
            parse_verdict("user likes tea lol", "\"The user enjoys tea.\""),
            Verdict::Accepted {
                text: "The user enjoys tea.".into(),
                rewritten: true
            }
        );
    }

    #[test]
    fn test_parse_verdict_rejections() {
        assert_eq!(
            parse_verdict("hi", "REJECTED: trivia"),
            Verdict::Rejected {
                reason: "trivia".into()
            }
        );
        assert_eq!(
            parse_verdict("hi", "rejected - small talk"),
            Verdict::Rejected {
                reason: "small talk".into()
            }
        );
        assert_eq!(
            parse_verdict("hi", "REJECTED"),
            Verdict::Rejected {
                reason: "no reason given".into()
            }
        );
        assert!(!parse_verdict("hi", "  ").is_accepted());
        assert!(!parse_verdict("hi", "REJECTED:").is_accepted());
        assert!(!parse_verdict("hi", "```\n```").is_accepted());
    }

    #[test]
    fn test_parse_verdict_keeps_text_starting_with_rejected() {
        let reply = "Rejected by MIT; the user is retrying next year.";
        assert_eq!(
            parse_verdict("got rejected by MIT, trying again next year", reply),
            Verdict::Accepted {
                text: reply.into(),
                rewritten: true
            }
        );
        assert!(parse_verdict("x", "REJECTEDNESS is a feeling").is_accepted());
    }

    #[test]
    fn test_system_prompt_lists_rules() {
        let (validator, _) = make_validator(MockBackend::new(vec![]), ValidatorConfig::default());
        let prompt = validator.system_prompt();
        assert!(prompt.contains("(no-toxicity)"));
        assert!(prompt.contains("(no-trivia)"));
        assert!(prompt.contains("(no-defensiveness)"));
        assert!(prompt.contains("the assistant"));
    }

    #[test]
    fn test_custom_persona_and_rules() {
        let config = ValidatorConfig {
            persona: "Juniper".into(),
            rules: vec![PolicyRule::new("no-gossip", "Reject gossip about third parties.")],
            ..Default::default()
        };
        let (validator, _) = make_validator(MockBackend::new(vec![]), config);
        let prompt = validator.system_prompt();
        assert!(prompt.contains("Juniper"));
        assert!(prompt.contains("(no-gossip)"));
        assert!(!prompt.contains("(no-trivia)"));
    }

    #[tokio::test]
    async fn test_local_check_skips_call() {
        let (validator, backend) =
            make_validator(MockBackend::with_text("ok"), ValidatorConfig::default());
        assert!(!validator.validate("   ").await.is_accepted());
        assert!(!validator.validate("bad\0byte").await.is_accepted());
        assert!(!validator.validate(&"x".repeat(5_000)).await.is_accepted());
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn test_validate_sends_candidate() {
        let (validator, backend) = make_validator(
            MockBackend::with_text("The user prefers green tea."),
            ValidatorConfig::default(),
        );
        let verdict = validator.validate("  user prefers green tea  ").await;
        assert_eq!(
            verdict,
            Verdict::Accepted {
                text: "The user prefers green tea.".into(),
                rewritten: true
            }
        );

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].messages[0].content,
            "Proposed memory: user prefers green tea"
        );
        assert!(requests[0].system.as_deref().unwrap_or("").contains("REJECTED"));
    }

    #[tokio::test]
    async fn test_call_failure_rejects() {
        let (validator, _) =
            make_validator(MockBackend::failing("down"), ValidatorConfig::default());
        let verdict = validator.validate("Likes tea").await;
        assert!(matches!(verdict, Verdict::Rejected { reason } if reason.contains("unavailable")));
    }

    #[tokio::test]
    async fn test_disabled_accepts_without_call() {
        let config = ValidatorConfig {
            enabled: false,
            ..Default::default()
        };
        let (validator, backend) = make_validator(MockBackend::new(vec![]), config);
        assert!(validator.validate("Likes tea").await.is_accepted());
        assert_eq!(backend.request_count(), 0);
    }
}
