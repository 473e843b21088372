use anyhow::{anyhow, Result};
use async_trait::async_trait;
use genai::chat::{ChatMessage, ChatRequest, ContentPart};
use genai::resolver::{AuthData, AuthResolver};
use genai::{Client, ModelIden};

use crate::models::{RecordValue, UserDataRecord};

use super::{AiOracle, AiSuggestion};

const SYSTEM_PROMPT: &str = "\
You are a form-filling assistant. You receive a screenshot of a web page and \
the user's data. Respond with ONLY a JSON object, no prose, shaped as:\n\
{\"field_mappings\": {\"<css selector>\": \"<value>\"}, \
\"action_sequence\": [{\"action\": \"click\", \"selector\": \"...\"}], \
\"confidence\": 0.0}\n\
Only reference fields you can actually see. Use confidence below 0.5 when \
the page is ambiguous.";

/// Vision-capable oracle over the genai unified LLM client.
pub struct GenaiOracle {
    client: Client,
    model: String,
}

impl GenaiOracle {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::default(),
            model: model.into(),
        }
    }

    /// Pass the API key directly instead of relying on environment variables.
    pub fn with_api_key(model: impl Into<String>, api_key: String) -> Self {
        let auth_resolver = AuthResolver::from_resolver_fn(
            move |_model_iden: ModelIden| -> std::result::Result<Option<AuthData>, genai::resolver::Error> {
                Ok(Some(AuthData::from_single(api_key.clone())))
            },
        );
        Self {
            client: Client::builder().with_auth_resolver(auth_resolver).build(),
            model: model.into(),
        }
    }

    fn describe_record(record: &UserDataRecord) -> String {
        record
            .iter()
            .map(|(key, value)| match value {
                RecordValue::Scalar(s) => format!("- {}: {}", key, s),
                RecordValue::FileRef(p) => format!("- {} (file): {}", key, p),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl AiOracle for GenaiOracle {
    async fn suggest(
        &self,
        screenshot: &str,
        goal: &str,
        record: &UserDataRecord,
    ) -> Result<AiSuggestion> {
        let prompt = format!(
            "Goal: {}\n\nUser data:\n{}",
            goal,
            Self::describe_record(record)
        );
        let parts = vec![
            ContentPart::from_text(prompt),
            ContentPart::from_binary_base64(
                "image/png",
                screenshot.to_string(),
                Some("page.png".to_string()),
            ),
        ];
        let request = ChatRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(parts),
        ]);

        let response = self
            .client
            .exec_chat(&self.model, request, None)
            .await
            .map_err(|e| anyhow!("oracle request failed: {}", e))?;

        let text = response
            .first_text()
            .ok_or_else(|| anyhow!("no text in oracle response"))?;

        parse_suggestion(text)
    }
}

/// Parse the oracle's JSON reply, tolerating markdown code fences.
fn parse_suggestion(text: &str) -> Result<AiSuggestion> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end_matches("```").trim())
        .unwrap_or(trimmed);
    let suggestion: AiSuggestion =
        serde_json::from_str(body).map_err(|e| anyhow!("unparseable oracle reply: {}", e))?;
    Ok(AiSuggestion {
        confidence: suggestion.confidence.clamp(0.0, 1.0),
        ..suggestion
    })
}
