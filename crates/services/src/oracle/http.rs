use std::env;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use tutor_core::model::{Evaluation, Question, retain_valid};

use super::json::extract_json_object;
use super::{
    ChatRole, ChatTurn, LearningHistory, QuestionOracle, StudentContext, TopicContext, TutorChat,
};
use crate::error::OracleError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

const GENERATE_INSTRUCTION: &str = "Write mathematics practice questions for the student and \
topic below. Reply with one JSON object {\"questions\": [...]} where each question has \
question_text, question_type (multiple_choice|short_answer|problem_solving), difficulty \
(easy|medium|hard), hints (array), correct_answer, solution_steps (array), focuses_on.";

const EVALUATE_INSTRUCTION: &str = "Mark the student's answer. Reply with one JSON object with \
is_correct (bool), accuracy_score (0..1), feedback, conceptual_understanding \
(strong|developing|needs_work), identified_weakness (string or null), suggested_hint \
(string or null), encouragement.";

const TUTOR_INSTRUCTION: &str = "Help the student with the current question by asking guiding \
questions. Never state the answer. Reply in plain text.";
const TUTOR_MAX_TOKENS: u32 = 500;

#[derive(Clone, Debug)]
pub struct OracleConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Model used for the second generation attempt.
    pub fallback_model: String,
    pub timeout: Duration,
}

impl OracleConfig {
    /// Read the oracle settings from `TUTOR_AI_*` variables.
    ///
    /// Returns `None` when no API key is set, which disables the oracle.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("TUTOR_AI_API_KEY").ok()?;
        if api_key.trim().is_empty() {
            return None;
        }
        let base_url = env::var("TUTOR_AI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let model = env::var("TUTOR_AI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());
        let fallback_model = env::var("TUTOR_AI_FALLBACK_MODEL").unwrap_or_else(|_| model.clone());
        let timeout_secs = env::var("TUTOR_AI_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Some(Self {
            base_url,
            api_key,
            model,
            fallback_model,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// `QuestionOracle` backed by an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct HttpOracle {
    client: Client,
    config: Option<OracleConfig>,
}

impl HttpOracle {
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(OracleConfig::from_env())
    }

    #[must_use]
    pub fn new(config: Option<OracleConfig>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.is_some()
    }

    fn config(&self) -> Result<&OracleConfig, OracleError> {
        self.config.as_ref().ok_or(OracleError::Disabled)
    }

    async fn complete(
        &self,
        config: &OracleConfig,
        model: &str,
        instruction: &str,
        payload: &Value,
        temperature: f32,
    ) -> Result<String, OracleError> {
        let messages = vec![
            ChatMessage {
                role: "system",
                content: instruction.to_string(),
            },
            ChatMessage {
                role: "user",
                content: payload.to_string(),
            },
        ];
        self.send(config, model, messages, temperature, None).await
    }

    async fn send(
        &self,
        config: &OracleConfig,
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, OracleError> {
        let url = format!(
            "{}/chat/completions",
            config.base_url.trim_end_matches('/')
        );
        let request = ChatRequest {
            model: model.to_string(),
            messages,
            temperature,
            max_tokens,
        };

        let body: ChatResponse = with_timeout(config.timeout, async {
            let response = self
                .client
                .post(url)
                .bearer_auth(&config.api_key)
                .json(&request)
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(OracleError::HttpStatus(response.status()));
            }
            Ok::<ChatResponse, OracleError>(response.json().await?)
        })
        .await?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(OracleError::EmptyResponse)?;

        Ok(content)
    }

    async fn generate_once(
        &self,
        config: &OracleConfig,
        model: &str,
        payload: &Value,
        count: usize,
    ) -> Result<Vec<Question>, OracleError> {
        let reply = self
            .complete(config, model, GENERATE_INSTRUCTION, payload, 0.7)
            .await?;
        let mut questions = parse_questions(&reply)?;
        questions.truncate(count);
        Ok(questions)
    }
}

async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, OracleError>>,
) -> Result<T, OracleError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| OracleError::Timeout)?
}

/// Parse a generation reply, keeping only well-formed, valid questions.
fn parse_questions(reply: &str) -> Result<Vec<Question>, OracleError> {
    let object = extract_json_object(reply)
        .ok_or_else(|| OracleError::Parse("reply contains no JSON object".into()))?;
    let parsed: GenerationReply =
        serde_json::from_str(object).map_err(|e| OracleError::Parse(e.to_string()))?;

    let total = parsed.questions.len();
    let decoded: Vec<Question> = parsed
        .questions
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect();
    let valid = retain_valid(decoded);
    if valid.len() < total {
        debug!(total, kept = valid.len(), "dropped malformed generated questions");
    }
    if valid.is_empty() {
        return Err(OracleError::NoValidQuestions);
    }
    Ok(valid)
}

fn parse_evaluation(reply: &str) -> Result<Evaluation, OracleError> {
    let object = extract_json_object(reply)
        .ok_or_else(|| OracleError::Parse("reply contains no JSON object".into()))?;
    let evaluation: Evaluation =
        serde_json::from_str(object).map_err(|e| OracleError::Parse(e.to_string()))?;
    if evaluation.feedback.trim().is_empty() {
        return Err(OracleError::Parse("evaluation has no feedback".into()));
    }
    Ok(evaluation.normalized())
}

#[async_trait]
impl QuestionOracle for HttpOracle {
    async fn generate_questions(
        &self,
        student: &StudentContext,
        topic: &TopicContext,
        count: usize,
        history: Option<&LearningHistory>,
    ) -> Result<Vec<Question>, OracleError> {
        let config = self.config()?;
        let payload = json!({
            "student": student,
            "topic": topic,
            "num_questions": count,
            "learning_history": history.filter(|h| !h.is_empty()),
        });

        let models = [config.model.as_str(), config.fallback_model.as_str()];
        let mut last = OracleError::NoValidQuestions;
        for (attempt, model) in (1_u32..).zip(models) {
            info!(attempt, model, topic = %topic.code, "generating questions");
            match self.generate_once(config, model, &payload, count).await {
                Ok(questions) => {
                    info!(attempt, count = questions.len(), "generated questions");
                    return Ok(questions);
                }
                Err(err) => {
                    warn!(attempt, model, error = %err, "question generation attempt failed");
                    last = err;
                }
            }
        }

        Err(OracleError::Generation {
            attempts: 2,
            last: Box::new(last),
        })
    }

    async fn evaluate_answer(
        &self,
        question: &Question,
        student_answer: &str,
        student: &StudentContext,
    ) -> Result<Evaluation, OracleError> {
        let config = self.config()?;
        let payload = json!({
            "question": question.text,
            "correct_answer": question.correct_answer,
            "student_answer": student_answer,
            "student": student,
        });
        let reply = self
            .complete(config, &config.model, EVALUATE_INSTRUCTION, &payload, 0.5)
            .await?;
        parse_evaluation(&reply)
    }
}

#[async_trait]
impl TutorChat for HttpOracle {
    async fn reply(
        &self,
        student: &StudentContext,
        topic: &TopicContext,
        question: &Question,
        history: &[ChatTurn],
        message: &str,
    ) -> Result<String, OracleError> {
        let config = self.config()?;
        let context = json!({
            "student": { "first_name": student.first_name, "grade_level": student.grade_level },
            "topic": topic.title,
            "current_question": question.text,
        });
        let messages = tutor_messages(&context, history, message);
        debug!(turns = history.len(), topic = %topic.code, "asking tutor");
        let reply = self
            .send(config, &config.model, messages, 0.7, Some(TUTOR_MAX_TOKENS))
            .await?;
        Ok(reply.trim().to_string())
    }
}

/// System instruction, then the question context, then the conversation.
fn tutor_messages(context: &Value, history: &[ChatTurn], message: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 3);
    messages.push(ChatMessage {
        role: "system",
        content: format!("{TUTOR_INSTRUCTION}\n{context}"),
    });
    messages.extend(history.iter().map(|turn| ChatMessage {
        role: match turn.role {
            ChatRole::Student => "user",
            ChatRole::Tutor => "assistant",
        },
        content: turn.content.clone(),
    }));
    messages.push(ChatMessage {
        role: "user",
        content: message.to_string(),
    });
    messages
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerationReply {
    questions: Vec<Value>,
}
