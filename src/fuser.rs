use serde::{Deserialize, Serialize};

use crate::models::{AssignedValue, FieldMapping, MappedValue, ValueSource};
use crate::oracle::{AiSuggestion, SuggestedAction};

/// The fused per-form plan the fill phase executes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionPlan {
    pub mapping: FieldMapping,
    /// Oracle-proposed page actions, kept for states with no heuristic
    /// alternative (entry seeking, submit candidates).
    pub action_sequence: Vec<SuggestedAction>,
    pub confidence: f64,
    pub used_ai: bool,
}

/// Merges heuristic mappings with optional AI suggestions.
#[derive(Debug, Clone, Copy)]
pub struct GuidanceFuser {
    threshold: f64,
}

impl Default for GuidanceFuser {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl GuidanceFuser {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Below-threshold or absent suggestions leave the heuristic plan
    /// untouched. An accepted suggestion wins per-field, but heuristic
    /// entries still fill anything the AI plan omits (union, not
    /// replacement). Plan confidence is the AI confidence when used,
    /// otherwise the mean classification confidence of the mapped fields.
    pub fn fuse(&self, heuristic: &FieldMapping, suggestion: Option<&AiSuggestion>) -> ActionPlan {
        let accepted = suggestion.filter(|s| s.confidence >= self.threshold);

        let Some(suggestion) = accepted else {
            return ActionPlan {
                mapping: heuristic.clone(),
                action_sequence: Vec::new(),
                confidence: heuristic.mean_confidence(),
                used_ai: false,
            };
        };

        let mut mapping = heuristic.clone();
        for (field_id, value) in &suggestion.field_mappings {
            mapping.insert(
                field_id.clone(),
                MappedValue::new(
                    AssignedValue::Text(value.clone()),
                    ValueSource::Ai,
                    suggestion.confidence,
                ),
            );
        }

        ActionPlan {
            mapping,
            action_sequence: suggestion.action_sequence.clone(),
            confidence: suggestion.confidence,
            used_ai: true,
        }
    }
}
