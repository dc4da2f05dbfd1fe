//! Question generation and answer grading through a chat-completions API.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::TutorConfig;
use crate::error::{Error, Result};

pub const FALLBACK_SCORE: u8 = 50;
pub const FALLBACK_MODEL_ANSWER: &str = "The model answer could not be generated.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRequest {
    pub term_name: String,
    pub description: String,
    pub question: String,
    pub user_answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grading {
    pub score: u8,
    pub feedback: String,
    pub model_answer: String,
}

pub trait QuestionService {
    fn generate_question(&self, term_name: &str) -> impl Future<Output = Result<String>> + Send;
}

pub trait GradingService {
    fn grade_answer(&self, request: &GradeRequest) -> impl Future<Output = Result<Grading>> + Send;
}

/// Both services, as the web server needs them.
pub trait Tutor: QuestionService + GradingService + Send + Sync + 'static {}

impl<T> Tutor for T where T: QuestionService + GradingService + Send + Sync + 'static {}

/// Graders send the score either as a number or as a numeric string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawScore {
    Number(f64),
    Text(String),
}

impl RawScore {
    fn value(&self) -> Option<f64> {
        match self {
            RawScore::Number(n) => Some(*n),
            RawScore::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Deserialize)]
struct RawGrading {
    score: RawScore,
    #[serde(default)]
    feedback: String,
    #[serde(default, alias = "modelAnswer")]
    model_answer: String,
}

fn extract_json_object(content: &str) -> &str {
    match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => content,
    }
}

/// Interpret the grader's reply. Text that is not a JSON grading object
/// becomes a low-confidence fallback; a score outside 0..=100 is an error.
pub fn parse_grading(content: &str) -> Result<Grading> {
    let parsed = serde_json::from_str::<RawGrading>(extract_json_object(content))
        .map_err(|e| e.to_string())
        .and_then(|raw| match raw.score.value() {
            Some(score) => Ok((raw, score)),
            None => Err("score is not a number".to_string()),
        });
    let (raw, score) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => {
            log::warn!("grader returned unparseable content ({e}), using fallback score");
            return Ok(Grading {
                score: FALLBACK_SCORE,
                feedback: content.to_string(),
                model_answer: FALLBACK_MODEL_ANSWER.to_string(),
            });
        }
    };

    if !score.is_finite() || !(0.0..=100.0).contains(&score) {
        return Err(Error::service(format!(
            "grader returned score {score} outside 0..=100"
        )));
    }

    Ok(Grading {
        score: score.round() as u8,
        feedback: raw.feedback,
        model_answer: raw.model_answer,
    })
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiTutor {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiTutor {
    pub fn new(config: &TutorConfig) -> Result<OpenAiTutor> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::config("OPENAI_API_KEY is not set"))?;
        Ok(OpenAiTutor {
            client: reqwest::Client::new(),
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: String, temperature: f32, max_tokens: u32) -> Result<String> {
        let req = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature,
            max_tokens,
        };
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body: Value = resp.json().await.unwrap_or(Value::Null);
            let message = body
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            log::error!("chat completion failed: status={status} message={message}");
            return Err(Error::service(format!("API error ({status}): {message}")));
        }

        let data: Value = resp.json().await?;
        completion_text(&data)
    }
}

fn completion_text(data: &Value) -> Result<String> {
    data.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .ok_or_else(|| Error::service("response has no message content"))
}

const QUESTION_SYSTEM: &str = "You write study questions for a flashcard application. \
Given a term, write one question that checks whether the learner understands it.";

const GRADING_SYSTEM: &str = "You grade answers in a flashcard application. Score the learner's \
answer out of 100 and give feedback and a model answer. Reply with JSON only: \
{\"score\": number, \"feedback\": \"text\", \"modelAnswer\": \"text\"}";

impl QuestionService for OpenAiTutor {
    async fn generate_question(&self, term_name: &str) -> Result<String> {
        let user = format!("Write one question about the following term. Output only the question.\n\nTerm: {term_name}");
        self.complete(QUESTION_SYSTEM, user, 0.7, 500).await
    }
}

impl GradingService for OpenAiTutor {
    async fn grade_answer(&self, request: &GradeRequest) -> Result<Grading> {
        let user = format!(
            "Grade the learner's answer.\n\n[Term]\n{}\n[Description]\n{}\n\n[Question]\n{}\n\n[Learner's answer]\n{}\n\n\
             Return JSON with score (0-100), feedback and modelAnswer.",
            request.term_name, request.description, request.question, request.user_answer
        );
        let content = self.complete(GRADING_SYSTEM, user, 0.3, 1000).await?;
        parse_grading(&content)
    }
}

/// Canned replies for exercising the quiz flow without a network.
#[cfg(test)]
pub(crate) struct ScriptedTutor {
    pub question: Option<String>,
    pub score: Option<u8>,
}

#[cfg(test)]
impl QuestionService for ScriptedTutor {
    async fn generate_question(&self, term_name: &str) -> Result<String> {
        match &self.question {
            Some(q) => Ok(format!("{q} ({term_name})")),
            None => Err(Error::service("question service unavailable")),
        }
    }
}

#[cfg(test)]
impl GradingService for ScriptedTutor {
    async fn grade_answer(&self, request: &GradeRequest) -> Result<Grading> {
        match self.score {
            Some(score) => Ok(Grading {
                score,
                feedback: format!("feedback on {}", request.user_answer),
                model_answer: request.description.clone(),
            }),
            None => Err(Error::service("grading service unavailable")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let g = parse_grading(r#"{"score": 85, "feedback": "Good", "modelAnswer": "Ownership"}"#).unwrap();
        assert_eq!(g.score, 85);
        assert_eq!(g.feedback, "Good");
        assert_eq!(g.model_answer, "Ownership");
    }

    #[test]
    fn parses_fenced_json() {
        let content = "Here you go:\n```json\n{\"score\": 72.6, \"feedback\": \"ok\", \"model_answer\": \"x\"}\n```";
        let g = parse_grading(content).unwrap();
        assert_eq!(g.score, 73);
        assert_eq!(g.model_answer, "x");
    }

    #[test]
    fn accepts_score_as_string() {
        let g = parse_grading(r#"{"score": "85", "feedback": "Good", "modelAnswer": "x"}"#).unwrap();
        assert_eq!(g.score, 85);
        assert!(matches!(parse_grading(r#"{"score": "120"}"#), Err(Error::Service(_))));

        let g = parse_grading(r#"{"score": "high", "feedback": "Good"}"#).unwrap();
        assert_eq!(g.score, FALLBACK_SCORE);
    }

    #[test]
    fn prose_falls_back() {
        let g = parse_grading("Nice try, roughly half right.").unwrap();
        assert_eq!(g.score, FALLBACK_SCORE);
        assert_eq!(g.feedback, "Nice try, roughly half right.");
        assert_eq!(g.model_answer, FALLBACK_MODEL_ANSWER);
    }

    #[test]
    fn out_of_range_score_is_service_error() {
        assert!(matches!(parse_grading(r#"{"score": 140}"#), Err(Error::Service(_))));
        assert!(matches!(parse_grading(r#"{"score": -1}"#), Err(Error::Service(_))));
    }

    #[test]
    fn completion_text_reads_first_choice() {
        let data = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "  What is a lifetime?\n"}}]
        });
        assert_eq!(completion_text(&data).unwrap(), "What is a lifetime?");
        assert!(completion_text(&serde_json::json!({"choices": []})).is_err());
    }

    #[test]
    fn missing_api_key_is_config_error() {
        let config = TutorConfig {
            api_key: None,
            ..TutorConfig::default()
        };
        assert!(matches!(OpenAiTutor::new(&config), Err(Error::Config(_))));
    }
}
