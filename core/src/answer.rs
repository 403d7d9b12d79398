//! C8 — Answer engine. Formats retrieved chunks into a context block, builds
//! the prompt, invokes the LLM, and validates the response (blocked-phrase
//! detection, domain-rule date-token post-check) before returning an
//! [`Answer`].

use crate::config::AppConfig;
use crate::domain_rules::{self, RuleOutcome};
use crate::llm::LlmClient;
use crate::models::{Answer, RankedChunk, Source};
use std::sync::Arc;
use tracing::warn;

const NOT_FOUND_TEMPLATE: &str =
    "I could not find information about that in the available HR documents.";

pub struct AnswerEngine {
    llm: Arc<LlmClient>,
    config: Arc<AppConfig>,
}

impl AnswerEngine {
    pub fn new(llm: Arc<LlmClient>, config: Arc<AppConfig>) -> Self {
        AnswerEngine { llm, config }
    }

    pub async fn answer(&self, question: &str, chunks: &[RankedChunk]) -> Answer {
        if let RuleOutcome::CannedAnswer { text, sources } =
            domain_rules::match_question(question, &self.config.domain_rules)
        {
            return Answer {
                text,
                sources,
                ok: true,
                tokens_used: 0,
                chunks_found: chunks.len(),
            };
        }

        if chunks.is_empty() {
            return Answer::not_found(NOT_FOUND_TEMPLATE);
        }

        let context = format_context(chunks);
        let prompt = build_prompt(question, &context);

        let (text, tokens_used) = match self.llm.generate(&prompt).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "LLM generation failed");
                return Answer {
                    text: NOT_FOUND_TEMPLATE.to_string(),
                    sources: Vec::new(),
                    ok: false,
                    tokens_used: 0,
                    chunks_found: chunks.len(),
                };
            }
        };

        let text = if domain_rules::is_blocked_response(&text, &self.config.blocked_response_patterns) {
            NOT_FOUND_TEMPLATE.to_string()
        } else if let Some(rule) = domain_rules::find_matching_rule(question, &self.config.domain_rules) {
            if domain_rules::answer_missing_required_tokens(&text, rule) {
                rule.canned_answer.clone()
            } else {
                text
            }
        } else {
            text
        };

        Answer {
            text,
            sources: dedup_sources(chunks),
            ok: true,
            tokens_used,
            chunks_found: chunks.len(),
        }
    }
}

/// Builds the `[Source i: title]\ncontent\n` context block the prompt is
/// grounded on, in retrieval-rank order.
fn format_context(chunks: &[RankedChunk]) -> String {
    let mut context = String::new();
    for (i, ranked) in chunks.iter().enumerate() {
        context.push_str(&format!(
            "[Source {}: {}]\n{}\n\n",
            i + 1,
            ranked.document_title,
            ranked.chunk.content
        ));
    }
    context
}

fn build_prompt(question: &str, context: &str) -> String {
    format!(
        r#"You are an HR assistant that answers employee questions using only the provided context documents.

INSTRUCTIONS:
1. Answer using ONLY the information in the context below.
2. Be concise and direct.
3. If the context does not contain enough information to answer, say so clearly rather than guessing.
4. Do not invent policies, dates, or figures not present in the context.

CONTEXT:
{context}

QUESTION: {question}

ANSWER:"#
    )
}

/// Caps sources at 3, deduplicated by document title, in the order chunks
/// were ranked. The first chunk seen for a given title is the one cited.
fn dedup_sources(chunks: &[RankedChunk]) -> Vec<Source> {
    let mut seen_titles = std::collections::HashSet::new();
    let mut sources = Vec::new();
    for ranked in chunks {
        if !seen_titles.insert(ranked.document_title.clone()) {
            continue;
        }
        sources.push(Source {
            title: ranked.document_title.clone(),
            chunk_index: ranked.chunk.chunk_index,
            document_id: ranked.chunk.document_id,
        });
        if sources.len() >= 3 {
            break;
        }
    }
    sources
}
