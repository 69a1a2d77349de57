//! Derived user profiles.
//!
//! A profile is a prose summary plus tags, generated from the newest `User`
//! records and stored apart from the archive. It is refreshed at most once
//! per cooldown window and only once there is enough material.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use reverie_config::ProfileConfig;
use reverie_llm::{CompletionRequest, Message};
use reverie_memory::{Category, ListOrder, MemoryRecord, UserMemoryStore, UserProfile};

use crate::error::Result;
use crate::gateway::ExternalCalls;
use crate::parse::{clean_items, parse_json_reply};

/// What a refresh attempt did.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileOutcome {
    /// A new profile was stored.
    Updated(UserProfile),
    /// Preconditions not met; nothing was called.
    NotDue { reason: String },
    /// The model call or its reply failed; the old profile is untouched.
    Failed { reason: String },
}

#[derive(Debug, Deserialize)]
struct ProfileReply {
    profile: String,
    #[serde(default)]
    tags: Vec<String>,
}

/// Generates and stores user profiles.
pub struct ProfileUpdater {
    gateway: Arc<ExternalCalls>,
    config: ProfileConfig,
    persona: String,
}

impl ProfileUpdater {
    /// Create an updater.
    pub fn new(gateway: Arc<ExternalCalls>, config: ProfileConfig, persona: impl Into<String>) -> Self {
        Self {
            gateway,
            config,
            persona: persona.into(),
        }
    }

    /// Why a refresh would not run now, or `None` if it is due.
    pub fn not_due_reason(
        &self,
        user_records: usize,
        last_update: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<String> {
        if user_records <= self.config.min_records {
            return Some(format!(
                "{} user records, need more than {}",
                user_records, self.config.min_records
            ));
        }
        let last = last_update?;
        // A cooldown too large to represent never elapses.
        let due_at = i64::try_from(self.config.cooldown_hours)
            .ok()
            .and_then(TimeDelta::try_hours)
            .and_then(|cooldown| last.checked_add_signed(cooldown));
        match due_at {
            Some(due_at) if now >= due_at => None,
            _ => Some(format!("refreshed at {}, cooldown not elapsed", last.to_rfc3339())),
        }
    }

    /// Regenerate the profile if due; `force` skips the cooldown and floor
    /// but still needs at least one `User` record.
    pub async fn refresh(&self, store: &UserMemoryStore, force: bool) -> Result<ProfileOutcome> {
        let user_records = store.count(Some(Category::User))?;
        if user_records == 0 {
            return Ok(ProfileOutcome::NotDue {
                reason: "no user records".to_string(),
            });
        }
        if !force {
            let last = store.profile()?.map(|p| p.updated_at);
            if let Some(reason) = self.not_due_reason(user_records, last, Utc::now()) {
                debug!(user = %store.user_id(), reason = %reason, "Profile refresh not due");
                return Ok(ProfileOutcome::NotDue { reason });
            }
        }

        let records = store.list(
            Some(Category::User),
            Some(self.config.max_records),
            ListOrder::NewestFirst,
        )?;

        let reply = match self.gateway.complete(self.request(&records)).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(user = %store.user_id(), error = %e, "Profile generation failed");
                return Ok(ProfileOutcome::Failed {
                    reason: e.to_string(),
                });
            }
        };

        let Some(parsed) = parse_profile(&reply) else {
            warn!(user = %store.user_id(), "Profile reply unusable");
            return Ok(ProfileOutcome::Failed {
                reason: "profile reply was not usable JSON".to_string(),
            });
        };

        let profile = UserProfile {
            summary: parsed.profile,
            tags: parsed.tags,
            updated_at: Utc::now(),
            based_on: records.len(),
        };
        store.set_profile(&profile)?;
        info!(user = %store.user_id(), based_on = profile.based_on, "Profile updated");
        Ok(ProfileOutcome::Updated(profile))
    }

    fn request(&self, records: &[MemoryRecord]) -> CompletionRequest {
        let memories: String = records
            .iter()
            .map(|r| format!("- {}\n", r.content))
            .collect();
        let prompt = format!(
            "As an expert psychologist, analyse the following memories about a user.\n\
             Do NOT confuse the user with the AI ({persona}). Focus only on the user's traits.\n\n\
             Capture:\n\
             1. Cognitive style (how they think and learn)\n\
             2. Motivations and goals\n\
             3. Emotional baseline\n\
             4. The core paradox (one sentence on their internal complexity)\n\n\
             Memories:\n{memories}\n\
             Output JSON: {{\"profile\": \"full profile text\", \"tags\": [\"tag1\", \"tag2\"]}}",
            persona = self.persona,
        );
        CompletionRequest::new(vec![Message::user(prompt)], 1_000)
            .with_temperature(0.3)
            .with_json_response()
    }
}

fn parse_profile(reply: &str) -> Option<ProfileReply> {
    let mut parsed: ProfileReply = parse_json_reply(reply, "profile")?;
    parsed.profile = parsed.profile.trim().to_string();
    if parsed.profile.is_empty() {
        return None;
    }
    parsed.tags = clean_items(parsed.tags);
    Some(parsed)
}
