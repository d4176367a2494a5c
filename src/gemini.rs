use crate::models::{Idea, RefinedIdea};
use serde_json::{json, Value};
use thiserror::Error;
use serde::Deserialize;
use reqwest::Client;
use parking_lot::RwLock;
use tracing::{info, error};

const GENERATION_MODEL: &str = "gemini-2.5-flash";

/// Marker Gemini puts in the error body when the configured key does not
/// resolve to a usable project/key entity. Matching on wording is fragile,
/// but the provider exposes no typed code at this surface.
const CREDENTIAL_REJECTION_MARKER: &str = "Requested entity was not found";

// Sampling policy: generation leans creative, refinement leans consistent.
const GENERATION_TEMPERATURE: f64 = 0.8;
const GENERATION_TOP_P: f64 = 0.9;
const REFINEMENT_TEMPERATURE: f64 = 0.4;

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("no Gemini API key is configured")]
    MissingApiKey,
    #[error("API key rejected by provider: {0}")]
    CredentialRejected(String),
    #[error("operation failed: {0}")]
    OperationFailed(String),
}

/// Collapse every failure into the generic kind, except the one wording
/// the provider uses for an invalid/nonexistent key.
fn classify(message: String) -> GeminiError {
    if message.contains(CREDENTIAL_REJECTION_MARKER) {
        GeminiError::CredentialRejected(message)
    } else {
        GeminiError::OperationFailed(message)
    }
}

pub struct GeminiClient {
    client: Client,
    api_key: RwLock<String>,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        let base_url = std::env::var("GEMINI_API_BASE")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string());
        Self {
            client: Client::new(),
            api_key: RwLock::new(api_key),
            base_url,
        }
    }

    /// Replaces the configured key. Intended for the reselection flow after
    /// a `CredentialRejected`, not for routine rotation.
    pub fn set_api_key(&self, api_key: String) {
        info!("🔑 API key reselected");
        *self.api_key.write() = api_key;
    }

    fn current_key(&self) -> Result<String, GeminiError> {
        let key = self.api_key.read().clone();
        if key.trim().is_empty() {
            return Err(GeminiError::MissingApiKey);
        }
        Ok(key)
    }

    /// One schema-constrained `generateContent` call. Returns the raw JSON
    /// text the model produced; callers parse it into their own shape.
    async fn generate_json(
        &self,
        prompt: &str,
        schema: Value,
        temperature: f64,
        top_p: Option<f64>,
    ) -> Result<String, GeminiError> {
        let api_key = self.current_key()?;
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, GENERATION_MODEL, api_key
        );

        info!("🔗 Making request to: {}", url.replace(&api_key, "***"));

        let mut generation_config = json!({
            "responseMimeType": "application/json",
            "responseSchema": schema,
            "temperature": temperature,
        });
        if let Some(top_p) = top_p {
            generation_config["topP"] = json!(top_p);
        }
        let request_body = json!({
            "contents": [{
                "parts": [{"text": prompt}]
            }],
            "generationConfig": generation_config,
        });

        let response = self.client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| classify(e.to_string()))?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!("❌ API error response: {}", error_body);
            return Err(classify(format!("status={} body={}", status, error_body)));
        }

        let response_text = response.text().await
            .map_err(|e| GeminiError::OperationFailed(e.to_string()))?;

        let parsed: GenerateContentResponse = serde_json::from_str(&response_text)
            .map_err(|e| GeminiError::OperationFailed(format!("envelope parse error: {}", e)))?;

        extract_text(&parsed)
            .ok_or_else(|| GeminiError::OperationFailed("no text content in response".into()))
    }

    /// Generates 3-5 idea summaries for free-text user interests. The input
    /// is embedded verbatim; the caller is responsible for rejecting
    /// empty/whitespace-only input before invoking this.
    pub async fn generate_ideas(&self, user_input: &str) -> Result<Vec<Idea>, GeminiError> {
        info!("💡 Generating ideas with Gemini API...");
        let prompt = build_generation_prompt(user_input);
        let text = self
            .generate_json(&prompt, idea_list_schema(), GENERATION_TEMPERATURE, Some(GENERATION_TOP_P))
            .await?;
        let ideas = parse_idea_list(&text)?;
        info!("✅ Parsed {} ideas from response", ideas.len());
        Ok(ideas)
    }

    /// Expands one previously generated idea into a refined plan.
    /// `profitability` is deliberately not forwarded to the prompt.
    pub async fn refine_idea(&self, idea: &Idea) -> Result<RefinedIdea, GeminiError> {
        info!("🔬 Refining idea with Gemini API...");
        let prompt = build_refinement_prompt(idea);
        let text = self
            .generate_json(&prompt, refined_idea_schema(), REFINEMENT_TEMPERATURE, None)
            .await?;
        parse_refined_idea(&text)
    }
}

fn build_generation_prompt(user_input: &str) -> String {
    format!(
        "بصفتك خبيرًا في استراتيجيات الأعمال والمنتجات الرقمية، قم بتحليل طلب المستخدم التالي وقم بتوليد 3 أفكار لمشاريع رقمية أو تطبيقات مربحة.\n\
        \n\
        طلب المستخدم: \"{user_input}\"\n\
        \n\
        لكل فكرة، قدم التفاصيل التالية باللغة العربية:\n\
        1.  **المفهوم (concept):** اسم جذاب ووصف موجز للفكرة.\n\
        2.  **الجمهور المستهدف (targetAudience):** من هم العملاء المحتملون.\n\
        3.  **طريقة الربح (monetization):** كيف سيجني المشروع المال.\n\
        4.  **الربحية المحتملة (profitability):** تقييم للربحية مع تبرير بسيط.\n\
        \n\
        تأكد من أن الأفكار مبتكرة وقابلة للتنفيذ. أرجع النتائج بصيغة JSON فقط بناءً على المخطط المحدد."
    )
}

fn build_refinement_prompt(idea: &Idea) -> String {
    format!(
        "بصفتك خبيرًا في استراتيجيات الأعمال والمنتجات الرقمية، قم بتوسيع فكرة المشروع التالية إلى خطة أولية مفصلة.\n\
        \n\
        الفكرة: \"{concept}\"\n\
        الجمهور المستهدف: \"{audience}\"\n\
        طريقة الربح: \"{monetization}\"\n\
        \n\
        قدم التفاصيل التالية باللغة العربية:\n\
        1.  **الميزة التنافسية الفريدة (uniqueSellingProposition):** ما الذي يميز هذا المشروع عن المنافسين.\n\
        2.  **الميزات الرئيسية (keyFeatures):** قائمة من 3 إلى 4 ميزات أساسية للمنتج.\n\
        3.  **استراتيجية التسويق (marketingStrategy):** كيف سيصل المشروع إلى جمهوره المستهدف.\n\
        4.  **المكدس التقني المقترح (technicalStack):** قائمة بالتقنيات المناسبة لتنفيذ المشروع.\n\
        \n\
        أرجع النتائج بصيغة JSON فقط بناءً على المخطط المحدد.",
        concept = idea.concept,
        audience = idea.target_audience,
        monetization = idea.monetization,
    )
}

// --- Response Schemas ---

fn idea_list_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "ideas": {
                "type": "ARRAY",
                "description": "قائمة من 3 إلى 5 أفكار لمشاريع رقمية.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "concept": {
                            "type": "STRING",
                            "description": "اسم الفكرة ووصف موجز ومبتكر لها في جملة أو جملتين."
                        },
                        "targetAudience": {
                            "type": "STRING",
                            "description": "من هو الجمهور المستهدف الأساسي لهذه الفكرة؟"
                        },
                        "monetization": {
                            "type": "STRING",
                            "description": "استراتيجية تحقيق الربح الرئيسية (مثال: اشتراك شهري، إعلانات، بيع مباشر)."
                        },
                        "profitability": {
                            "type": "STRING",
                            "description": "تحليل موجز للربحية المحتملة وتقييمها (عالية، متوسطة، منخفضة) مع سبب التقييم."
                        }
                    },
                    "required": ["concept", "targetAudience", "monetization", "profitability"]
                }
            }
        },
        "required": ["ideas"]
    })
}

fn refined_idea_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "uniqueSellingProposition": {
                "type": "STRING",
                "description": "الميزة التنافسية الفريدة التي تميز المشروع عن المنافسين."
            },
            "keyFeatures": {
                "type": "ARRAY",
                "description": "قائمة من 3 إلى 4 ميزات رئيسية للمنتج.",
                "items": { "type": "STRING" }
            },
            "marketingStrategy": {
                "type": "STRING",
                "description": "استراتيجية التسويق المقترحة للوصول إلى الجمهور المستهدف."
            },
            "technicalStack": {
                "type": "ARRAY",
                "description": "التقنيات المقترحة لبناء المشروع.",
                "items": { "type": "STRING" }
            }
        },
        "required": ["uniqueSellingProposition", "keyFeatures", "marketingStrategy", "technicalStack"]
    })
}

// --- Payload Parsing ---

/// Missing or null `ideas` degrades to an empty list; malformed JSON or a
/// malformed element is a hard failure. The asymmetry is deliberate.
fn parse_idea_list(text: &str) -> Result<Vec<Idea>, GeminiError> {
    #[derive(Deserialize)]
    struct IdeaListPayload {
        #[serde(default)]
        ideas: Option<Vec<Idea>>,
    }

    let payload: IdeaListPayload = serde_json::from_str(text.trim())
        .map_err(|e| GeminiError::OperationFailed(format!("idea list parse error: {}", e)))?;
    Ok(payload.ideas.unwrap_or_default())
}

/// All four fields are required; the provider's schema enforcement is
/// trusted, so a missing field fails the parse rather than defaulting.
fn parse_refined_idea(text: &str) -> Result<RefinedIdea, GeminiError> {
    serde_json::from_str(text.trim())
        .map_err(|e| GeminiError::OperationFailed(format!("refined idea parse error: {}", e)))
}

// --- Response Envelope Parsing ---

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate { #[serde(default)] content: Content }

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    Other(serde_json::Value),
}

fn extract_text(resp: &GenerateContentResponse) -> Option<String> {
    for c in &resp.candidates {
        for p in &c.content.parts {
            if let Part::Text { text } = p {
                return Some(text.trim().to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_idea() -> Idea {
        Idea {
            concept: "X".into(),
            target_audience: "Y".into(),
            monetization: "Z".into(),
            profitability: "W".into(),
        }
    }

    #[test]
    fn parses_arabic_idea_payload() {
        let text = r#"{"ideas":[{"concept":"A","targetAudience":"B","monetization":"C","profitability":"عالية"}]}"#;
        let ideas = parse_idea_list(text).unwrap();
        assert_eq!(
            ideas,
            vec![Idea {
                concept: "A".into(),
                target_audience: "B".into(),
                monetization: "C".into(),
                profitability: "عالية".into(),
            }]
        );
    }

    #[test]
    fn missing_ideas_field_is_empty_not_error() {
        let ideas = parse_idea_list(r#"{"note":"nothing here"}"#).unwrap();
        assert_eq!(ideas, Vec::<Idea>::new());
    }

    #[test]
    fn null_ideas_field_is_empty_not_error() {
        let ideas = parse_idea_list(r#"{"ideas":null}"#).unwrap();
        assert_eq!(ideas, Vec::<Idea>::new());
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = parse_idea_list("not json at all").unwrap_err();
        assert!(matches!(err, GeminiError::OperationFailed(_)));
    }

    #[test]
    fn idea_missing_a_field_is_an_error() {
        let text = r#"{"ideas":[{"concept":"A","targetAudience":"B","monetization":"C"}]}"#;
        let err = parse_idea_list(text).unwrap_err();
        assert!(matches!(err, GeminiError::OperationFailed(_)));
    }

    #[test]
    fn parses_refined_idea_with_empty_lists() {
        let text = r#"{
            "uniqueSellingProposition": "usp",
            "keyFeatures": [],
            "marketingStrategy": "ms",
            "technicalStack": []
        }"#;
        let refined = parse_refined_idea(text).unwrap();
        assert_eq!(refined.unique_selling_proposition, "usp");
        assert_eq!(refined.key_features, Vec::<String>::new());
        assert_eq!(refined.marketing_strategy, "ms");
        assert_eq!(refined.technical_stack, Vec::<String>::new());
    }

    #[test]
    fn refined_idea_missing_marketing_strategy_is_an_error() {
        let text = r#"{
            "uniqueSellingProposition": "usp",
            "keyFeatures": ["f1", "f2", "f3"],
            "technicalStack": ["Rust"]
        }"#;
        let err = parse_refined_idea(text).unwrap_err();
        assert!(matches!(err, GeminiError::OperationFailed(_)));
    }

    #[test]
    fn entity_not_found_classifies_as_credential_rejection() {
        let err = classify("status=403 body=Requested entity was not found.".into());
        assert!(matches!(err, GeminiError::CredentialRejected(_)));
    }

    #[test]
    fn other_messages_classify_as_generic_failure() {
        let err = classify("status=500 body=internal error".into());
        assert!(matches!(err, GeminiError::OperationFailed(_)));
    }

    #[test]
    fn generation_prompt_embeds_input_verbatim() {
        let prompt = build_generation_prompt("تطبيق لتعليم الطبخ");
        assert!(prompt.contains("تطبيق لتعليم الطبخ"));
    }

    #[test]
    fn refinement_prompt_forwards_three_fields_only() {
        let prompt = build_refinement_prompt(&sample_idea());
        assert!(prompt.contains("\"X\""));
        assert!(prompt.contains("\"Y\""));
        assert!(prompt.contains("\"Z\""));
        assert!(!prompt.contains("\"W\""));
    }

    #[test]
    fn extracts_first_text_part() {
        let raw = r#"{
            "candidates": [{
                "content": { "parts": [{"text": "  {\"ideas\":[]} "}] }
            }]
        }"#;
        let resp: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(extract_text(&resp), Some(r#"{"ideas":[]}"#.to_string()));
    }

    #[test]
    fn empty_candidates_yield_no_text() {
        let resp: GenerateContentResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert_eq!(extract_text(&resp), None);
    }

    #[test]
    fn schemas_require_all_fields() {
        let idea_schema = idea_list_schema();
        assert_eq!(idea_schema["required"], json!(["ideas"]));
        assert_eq!(
            idea_schema["properties"]["ideas"]["items"]["required"],
            json!(["concept", "targetAudience", "monetization", "profitability"])
        );

        let refined_schema = refined_idea_schema();
        assert_eq!(
            refined_schema["required"],
            json!(["uniqueSellingProposition", "keyFeatures", "marketingStrategy", "technicalStack"])
        );
    }

    #[test]
    fn blank_key_is_a_precondition_failure() {
        let client = GeminiClient::new("   ".into());
        assert!(matches!(client.current_key(), Err(GeminiError::MissingApiKey)));
    }

    #[test]
    fn reselected_key_replaces_the_old_one() {
        let client = GeminiClient::new(String::new());
        client.set_api_key("new-key".into());
        assert_eq!(client.current_key().unwrap(), "new-key");
    }
}
