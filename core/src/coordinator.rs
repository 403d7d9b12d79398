//! C10 — Query coordinator. The crate's single public entry point for
//! answering a question: validates input, runs retrieval, delegates to the
//! answer engine, and provides a hook point for query instrumentation.

use crate::answer::AnswerEngine;
use crate::config::AppConfig;
use crate::error::CoreError;
use crate::models::Answer;
use crate::retriever::Retriever;
use std::sync::Arc;
use tracing::info;

pub struct QueryCoordinator {
    retriever: Retriever,
    answer_engine: AnswerEngine,
    config: Arc<AppConfig>,
}

impl QueryCoordinator {
    pub fn new(retriever: Retriever, answer_engine: AnswerEngine, config: Arc<AppConfig>) -> Self {
        QueryCoordinator {
            retriever,
            answer_engine,
            config,
        }
    }

    /// Answers `question` on behalf of `user_id` (present for logging only;
    /// no per-user authorization is performed here).
    pub async fn ask(&self, question: &str, user_id: Option<&str>) -> Result<Answer, CoreError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(CoreError::InputError("question must not be empty".to_string()));
        }
        if question.chars().count() > self.config.max_question_len {
            return Err(CoreError::InputError(format!(
                "question exceeds maximum length of {} characters",
                self.config.max_question_len
            )));
        }

        let chunks = self.retriever.retrieve(question).await?;
        let answer = self.answer_engine.answer(question, &chunks).await;

        // Hook point for query logging / analytics; a no-op today but kept
        // as an explicit seam so a telemetry sink can be wired in later
        // without touching the call sites above.
        self.log_query(user_id, question, &answer);

        Ok(answer)
    }

    fn log_query(&self, user_id: Option<&str>, question: &str, answer: &Answer) {
        info!(
            user_id = user_id.unwrap_or("anonymous"),
            question_len = question.chars().count(),
            chunks_found = answer.chunks_found,
            ok = answer.ok,
            "query answered"
        );
    }
}
