//! Per-case session state: the opaque context blob the answer engine embeds
//! in its prompt, and the turn-by-turn record behind it.
//!
//! The engine only depends on the [`SessionContext`] trait; the JSON store
//! here is the default implementation. Context is deliberately constrained
//! to material that was itself retrieved (truncated chunk texts plus the
//! rolling summary), so the session cannot smuggle free-form claims into
//! the grounded prompt unchecked.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use crate::paths::{CaseId, CaseLayout};
use crate::store::documents::write_json_atomic;
use crate::types::{Clock, CoreError};

const MAX_FACTS: usize = 20;
const RECENT_FACTS_IN_CONTEXT: usize = 5;
const FACT_CHARS: usize = 200;

/// Case summary that persists across turns.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RollingSummary {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub client_background: String,
    #[serde(default)]
    pub key_chronology: Vec<String>,
    #[serde(default)]
    pub legal_issues_identified: Vec<String>,
    #[serde(default)]
    pub source_references: Vec<String>,
}

/// Persisted session state for a case, independent of any chat history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionState {
    pub case_id: String,
    #[serde(default)]
    pub retrieved_facts: Vec<String>,
    #[serde(default)]
    pub legal_sources_used: Vec<String>,
    #[serde(default)]
    pub rolling_summary: RollingSummary,
    #[serde(default)]
    pub turn_count: u32,
    #[serde(default = "chrono::Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "chrono::Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    fn fresh(case: &CaseId, now: DateTime<Utc>) -> Self {
        Self {
            case_id: case.as_str().to_string(),
            retrieved_facts: Vec::new(),
            legal_sources_used: Vec::new(),
            rolling_summary: RollingSummary::default(),
            turn_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// What the answer engine needs from session storage.
#[async_trait]
pub trait SessionContext: Send + Sync {
    /// Opaque context blob for the grounded prompt; empty is fine.
    async fn context_for(&self, case: &CaseId) -> String;

    /// Records a successful turn: which facts were retrieved and which
    /// legal sources were used.
    async fn record_turn(
        &self,
        case: &CaseId,
        retrieved_facts: Vec<String>,
        legal_source_ids: Vec<String>,
    ) -> Result<(), CoreError>;
}

/// JSON-file session store (`session.json` inside the case directory).
pub struct JsonSessionStore {
    layout: CaseLayout,
    clock: Arc<dyn Clock>,
}

impl JsonSessionStore {
    pub fn new(layout: CaseLayout, clock: Arc<dyn Clock>) -> Self {
        Self { layout, clock }
    }

    pub async fn load(&self, case: &CaseId) -> SessionState {
        let path = self.layout.session_path(case);
        match fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(state) => state,
                Err(err) => {
                    warn!(case = %case, error = %err, "corrupt session.json, starting fresh");
                    SessionState::fresh(case, self.clock.now())
                }
            },
            Err(_) => SessionState::fresh(case, self.clock.now()),
        }
    }

    async fn save(&self, case: &CaseId, mut state: SessionState) -> Result<(), CoreError> {
        self.layout.ensure_case(case).await?;
        state.updated_at = self.clock.now();
        write_json_atomic(&self.layout.session_path(case), &state).await
    }
}

#[async_trait]
impl SessionContext for JsonSessionStore {
    async fn context_for(&self, case: &CaseId) -> String {
        let state = self.load(case).await;
        let summary = &state.rolling_summary;
        let mut parts = Vec::new();

        if !summary.client_background.is_empty() {
            parts.push(format!("Client Background:\n{}", summary.client_background));
        }
        if !summary.key_chronology.is_empty() {
            parts.push(format!(
                "Key Chronology:\n{}",
                bullet_list(&summary.key_chronology)
            ));
        }
        if !summary.legal_issues_identified.is_empty() {
            parts.push(format!(
                "Legal Issues Identified:\n{}",
                bullet_list(&summary.legal_issues_identified)
            ));
        }
        if !state.retrieved_facts.is_empty() {
            let recent: Vec<String> = state
                .retrieved_facts
                .iter()
                .rev()
                .take(RECENT_FACTS_IN_CONTEXT)
                .rev()
                .cloned()
                .collect();
            parts.push(format!("Recent Retrieved Facts:\n{}", bullet_list(&recent)));
        }

        parts.join("\n\n")
    }

    async fn record_turn(
        &self,
        case: &CaseId,
        retrieved_facts: Vec<String>,
        legal_source_ids: Vec<String>,
    ) -> Result<(), CoreError> {
        let mut state = self.load(case).await;

        for fact in retrieved_facts {
            state.retrieved_facts.push(truncate_fact(&fact));
        }
        let overflow = state.retrieved_facts.len().saturating_sub(MAX_FACTS);
        if overflow > 0 {
            state.retrieved_facts.drain(..overflow);
        }

        for id in legal_source_ids {
            if !state.legal_sources_used.contains(&id) {
                state.legal_sources_used.push(id);
            }
        }

        state.turn_count += 1;
        self.save(case, state).await
    }
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate_fact(fact: &str) -> String {
    if fact.chars().count() > FACT_CHARS {
        let prefix: String = fact.chars().take(FACT_CHARS).collect();
        format!("{prefix}...")
    } else {
        fact.to_string()
    }
}
