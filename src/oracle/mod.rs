pub mod genai;

pub use genai::GenaiOracle;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::UserDataRecord;

/// A page-level action proposed by the oracle, executed verbatim only when
/// the engine has no heuristic alternative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum SuggestedAction {
    Click { selector: String },
    Fill { selector: String, value: String },
    Submit { selector: String },
}

/// Advisory output of the AI vision oracle for one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiSuggestion {
    /// Field selector → value to assign.
    #[serde(default)]
    pub field_mappings: BTreeMap<String, String>,
    #[serde(default)]
    pub action_sequence: Vec<SuggestedAction>,
    /// Self-reported confidence in [0,1].
    #[serde(default)]
    pub confidence: f64,
}

/// Optional AI advisory capability. The engine degrades to heuristic-only
/// behavior when no oracle is configured or a call fails; suggestions are
/// advice, never commands.
#[async_trait]
pub trait AiOracle: Send + Sync {
    /// Propose field mappings and actions for the current page. `screenshot`
    /// is base64-encoded PNG.
    async fn suggest(
        &self,
        screenshot: &str,
        goal: &str,
        record: &UserDataRecord,
    ) -> anyhow::Result<AiSuggestion>;
}
