use std::sync::LazyLock;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use firstin_core::{Job, JobAnalyzer, JobInsights, NopAnalyzer, PollError};

use crate::http::send_json;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// JSON Schema enforced server-side via structured outputs. Matches
/// [`RawInsights`] exactly so the response parses directly.
static INSIGHTS_SCHEMA: LazyLock<serde_json::Value> = LazyLock::new(|| {
    serde_json::json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "role_type": {
                "type": "string",
                "enum": [
                    "backend", "frontend", "fullstack", "infra",
                    "SRE", "devops", "platform", "AI/ML",
                    "data", "security", "mobile", "other"
                ]
            },
            "years_exp": {"type": "string"},
            "tech_stack": {
                "type": "array",
                "items": {"type": "string"}
            },
            "key_points": {
                "type": "array",
                "items": {"type": "string"},
                "minItems": 3,
                "maxItems": 3
            }
        },
        "required": ["role_type", "years_exp", "tech_stack", "key_points"]
    })
});

/// Enriches jobs with insights from an OpenAI-compatible chat endpoint.
///
/// Works with OpenAI directly or any compatible gateway. Analysis is
/// best-effort: every failure logs a warning and yields the job unchanged,
/// so a flaky LLM can never break a poll cycle.
#[derive(Clone)]
pub struct LlmAnalyzer {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl LlmAnalyzer {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, client: Client) -> Self {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL, client)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl AsRef<str>,
        client: Client,
    ) -> Self {
        Self {
            client,
            base_url: base_url.as_ref().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    async fn complete(
        &self,
        cancel: &CancellationToken,
        prompt: String,
    ) -> Result<String, PollError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system",
                    content: "You are a precise structured data extractor for job descriptions."
                        .to_string(),
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0,
            max_tokens: 1024,
            response_format: ResponseFormat {
                format_type: "json_schema",
                json_schema: JsonSchemaSpec {
                    name: "job_insights",
                    schema: INSIGHTS_SCHEMA.clone(),
                },
            },
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response: ChatResponse = send_json(
            self.client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&request),
            cancel,
            "llm completion",
        )
        .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| PollError::Parse("llm returned no choices".to_string()))
    }
}

impl JobAnalyzer for LlmAnalyzer {
    async fn analyze(&self, cancel: CancellationToken, mut job: Job) -> Job {
        let Some(description) = job
            .detail
            .as_ref()
            .and_then(|d| d.description.as_deref())
            .filter(|d| !d.is_empty())
        else {
            return job;
        };

        let prompt = build_prompt(description);
        let raw = match self.complete(&cancel, prompt).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(
                    company = %job.company,
                    title = %job.title,
                    error = %err,
                    "job analysis failed, keeping job unenriched"
                );
                return job;
            }
        };

        match parse_insights(&raw) {
            Ok(insights) => job.insights = Some(insights),
            Err(err) => {
                tracing::warn!(
                    company = %job.company,
                    title = %job.title,
                    error = %err,
                    "job insights did not parse, keeping job unenriched"
                );
            }
        }
        job
    }
}

fn build_prompt(description: &str) -> String {
    format!(
        "Analyze this job description and extract:\n\
         - role_type: the closest role category\n\
         - years_exp: the stated experience requirement, or \"unspecified\"\n\
         - tech_stack: up to 8 concrete technologies mentioned\n\
         - key_points: exactly 3 short takeaways a candidate should know\n\n\
         Job description:\n{description}"
    )
}

// ---- Chat API types ----

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: i32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: JsonSchemaSpec,
}

#[derive(Serialize)]
struct JsonSchemaSpec {
    name: &'static str,
    schema: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// The JSON shape returned by the LLM, matching [`INSIGHTS_SCHEMA`].
#[derive(Deserialize)]
struct RawInsights {
    role_type: String,
    years_exp: String,
    tech_stack: Vec<String>,
    key_points: Vec<String>,
}

/// Structured outputs guarantee schema-conforming JSON, so no code-fence
/// stripping is needed; the length clamps below guard against gateways that
/// enforce the schema loosely.
fn parse_insights(raw: &str) -> Result<JobInsights, PollError> {
    let ri: RawInsights =
        serde_json::from_str(raw).map_err(|e| PollError::Parse(format!("insights: {e}")))?;

    let mut key_points: [String; 3] = Default::default();
    for (slot, point) in key_points.iter_mut().zip(ri.key_points) {
        *slot = point;
    }

    let mut tech_stack = ri.tech_stack;
    tech_stack.truncate(8);

    Ok(JobInsights {
        role_type: ri.role_type,
        years_exp: ri.years_exp,
        tech_stack,
        key_points,
    })
}

/// Runtime-selected analyzer backend.
#[derive(Clone)]
pub enum AnyAnalyzer {
    Llm(LlmAnalyzer),
    Nop(NopAnalyzer),
}

impl JobAnalyzer for AnyAnalyzer {
    async fn analyze(&self, cancel: CancellationToken, job: Job) -> Job {
        match self {
            AnyAnalyzer::Llm(a) => a.analyze(cancel, job).await,
            AnyAnalyzer::Nop(a) => a.analyze(cancel, job).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insights_parse_and_clamp() {
        let raw = r#"{
            "role_type": "backend",
            "years_exp": "5+",
            "tech_stack": ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"],
            "key_points": ["one", "two", "three"]
        }"#;
        let insights = parse_insights(raw).unwrap();
        assert_eq!(insights.role_type, "backend");
        assert_eq!(insights.tech_stack.len(), 8, "tech stack capped at 8");
        assert_eq!(
            insights.key_points,
            ["one".to_string(), "two".into(), "three".into()]
        );
    }

    #[test]
    fn short_key_points_pad_with_empty() {
        let raw = r#"{"role_type": "other", "years_exp": "n/a", "tech_stack": [], "key_points": ["only"]}"#;
        let insights = parse_insights(raw).unwrap();
        assert_eq!(insights.key_points[0], "only");
        assert_eq!(insights.key_points[1], "");
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        assert!(matches!(
            parse_insights("```json\n{}\n```"),
            Err(PollError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn job_without_description_is_returned_unchanged() {
        let analyzer = LlmAnalyzer::new("key", "gpt-4o-mini", Client::new());
        let job = Job {
            id: "1".into(),
            company: "acme".into(),
            title: "Engineer".into(),
            location: String::new(),
            url: "https://x/1".into(),
            posted_at: None,
            first_seen: None,
            source: "test".into(),
            detail: None,
            insights: None,
        };

        let out = analyzer.analyze(CancellationToken::new(), job).await;
        assert!(out.insights.is_none());
    }

    #[test]
    fn prompt_embeds_the_description() {
        let prompt = build_prompt("Build things in Rust.");
        assert!(prompt.contains("Build things in Rust."));
        assert!(prompt.contains("exactly 3"));
    }
}
