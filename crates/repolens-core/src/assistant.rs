//! The question-answering pipeline.

use std::sync::Arc;

use repolens_index::{IndexError, RetrievedChunk, Retriever};
use repolens_llm::LlmError;
use repolens_llm::provider::LlmProvider;
use repolens_llm::retry::{RetryPolicy, with_retry};
use repolens_memory::{Turn, WindowBudget};

use crate::context::{ContextAssembler, ContextError};
use crate::session::{SessionId, SessionStore};

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] IndexError),
    #[error("answer generation failed: {0}")]
    Generation(#[from] LlmError),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("{provider} returned an empty answer")]
    EmptyAnswer { provider: String },
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    /// Chunks included in the prompt, best first.
    pub sources: Vec<RetrievedChunk>,
    /// Retrieval found nothing relevant; the answer is ungrounded.
    pub no_context: bool,
    /// Prompt budget used.
    pub context_tokens: usize,
}

pub struct Assistant<P: LlmProvider> {
    retriever: Retriever<P>,
    provider: Arc<P>,
    assembler: ContextAssembler,
    retry: RetryPolicy,
}

impl<P: LlmProvider> Assistant<P> {
    #[must_use]
    pub fn new(retriever: Retriever<P>, provider: Arc<P>, assembler: ContextAssembler) -> Self {
        Self {
            retriever,
            provider,
            assembler,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Answer `question` within the given session.
    ///
    /// The session's memory stays locked for the whole call. The user and
    /// assistant turns are appended only after a successful answer, so a
    /// failed call leaves the conversation unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError`] if retrieval, context assembly or
    /// generation fails, or the model returns an empty answer. An empty
    /// retrieval result is not an error.
    pub async fn ask(
        &self,
        sessions: &SessionStore,
        session_id: &SessionId,
        question: &str,
    ) -> Result<Answer, AssistantError> {
        let session = sessions.get_or_create(session_id);
        let mut memory = session.lock().await;

        let query = self.retriever.query(question);
        let retrieved = self.retriever.retrieve(&query).await?;
        let no_context = retrieved.is_empty();

        let window = memory.window(WindowBudget::Turns(memory.bound().max_turns));
        let context = self.assembler.assemble(question, &retrieved, &window)?;
        let messages = context.to_messages();

        let reply = with_retry(self.provider.name(), &self.retry, || {
            self.provider.chat(&messages)
        })
        .await?;
        let text = reply.trim();
        if text.is_empty() {
            return Err(AssistantError::EmptyAnswer {
                provider: self.provider.name().to_owned(),
            });
        }

        memory.append(Turn::user(question));
        memory.append(Turn::assistant(text));

        tracing::info!(
            session = %session_id,
            sources = context.retrieved_chunks().len(),
            turns_in_context = context.memory_window().len(),
            context_tokens = context.token_count(),
            no_context,
            "question answered"
        );

        Ok(Answer {
            text: text.to_owned(),
            sources: context.retrieved_chunks().to_vec(),
            no_context,
            context_tokens: context.token_count(),
        })
    }
}
