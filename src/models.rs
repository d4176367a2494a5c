use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};

/// One generated business-concept summary. Field names follow the
/// response schema declared to Gemini, so the wire form is camelCase.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Idea {
    pub concept: String,
    pub target_audience: String,
    pub monetization: String,
    pub profitability: String,
}

/// Expanded plan for a single idea. `key_features` and `technical_stack`
/// keep the model's ordering; an absent field is a parse failure, never
/// an empty default.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RefinedIdea {
    pub unique_selling_proposition: String,
    pub key_features: Vec<String>,
    pub marketing_strategy: String,
    pub technical_stack: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub user_input: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub ideas: Vec<Idea>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyUpdateRequest {
    pub api_key: String,
}
