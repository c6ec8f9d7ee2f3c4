//! Grounded answer generation.
//!
//! The [`Generator`] turns a [`RetrievalResult`] into a [`Prompt`] and hands
//! it to an injected [`CompletionProvider`], either for one complete
//! response or for a lazily pulled stream of fragments.
//!
//! # Context budget
//!
//! The rendered prompt is measured in whitespace tokens against
//! `max_context_tokens`. While it is over budget, the lowest-ranked chunk
//! is dropped. A provider that still rejects the prompt with
//! [`RagError::ContextTooLarge`] causes one more chunk to be dropped and the
//! request re-sent. The error reaches the caller only when the prompt is
//! too large with no context at all.
//!
//! # Streaming
//!
//! [`Generator::generate_stream`] opens the provider stream eagerly (so
//! connection failures surface as an `Err` before the first event) and then
//! returns a single-pass [`AnswerStream`]:
//!
//! ```text
//! Token("We ") → Token("rent ") → ... → Done { sources }
//! ```
//!
//! Fragments are forwarded in provider order, one at a time, with no
//! buffering. Dropping the stream drops the provider stream with it, which
//! tears down the upstream connection. A mid-stream failure is yielded as
//! the final `Err` item and is never retried.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::error::{retry_once, RagError, Result};
use crate::models::{AnswerResult, RetrievalResult, StreamEvent};
use crate::prompt::{Prompt, PromptTemplate};

/// Text fragments produced by a streaming completion.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Token events followed by one final [`StreamEvent::Done`].
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// A language-model completion capability.
///
/// Implementations report transport failures as
/// [`RagError::UpstreamUnavailable`] and a prompt the model cannot accept
/// as [`RagError::ContextTooLarge`].
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name for logs (e.g. `"openai"`).
    fn name(&self) -> &str;

    /// Produce one complete response.
    async fn complete(&self, prompt: &Prompt) -> Result<String>;

    /// Open a stream of response fragments.
    ///
    /// The returned stream must own every resource it needs, so dropping
    /// it releases the underlying connection.
    async fn complete_stream(&self, prompt: &Prompt) -> Result<FragmentStream>;
}

/// Generation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Upper bound on the rendered prompt size, in whitespace tokens.
    pub max_context_tokens: usize,
    pub template: PromptTemplate,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 3000,
            template: PromptTemplate::default(),
        }
    }
}

/// Builds grounded prompts and runs them through a [`CompletionProvider`].
pub struct Generator {
    llm: Arc<dyn CompletionProvider>,
    config: GeneratorConfig,
}

impl Generator {
    /// # Errors
    ///
    /// [`RagError::Configuration`] if `max_context_tokens == 0`.
    pub fn new(llm: Arc<dyn CompletionProvider>, config: GeneratorConfig) -> Result<Self> {
        if config.max_context_tokens == 0 {
            return Err(RagError::Configuration(
                "max_context_tokens must be >= 1".to_string(),
            ));
        }
        Ok(Self { llm, config })
    }

    /// Assemble the prompt for `query`, truncating the context block from
    /// the lowest-ranked chunk upward until it fits the budget.
    ///
    /// # Errors
    ///
    /// [`RagError::ContextTooLarge`] if the prompt is over budget with no
    /// context left.
    pub fn build_prompt(&self, query: &str, retrieval: &RetrievalResult) -> Result<Prompt> {
        let chunks = retrieval.items().iter().map(|h| h.chunk.clone()).collect();
        let mut prompt = Prompt::build(&self.config.template, query, chunks);
        let limit = self.config.max_context_tokens;

        let mut dropped = 0usize;
        while prompt.token_estimate() > limit {
            if !prompt.drop_lowest_ranked(&self.config.template) {
                return Err(RagError::ContextTooLarge {
                    prompt_tokens: prompt.token_estimate(),
                    limit,
                });
            }
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, kept = prompt.context().len(), "truncated context to fit budget");
        }
        Ok(prompt)
    }

    /// Produce a complete grounded answer.
    ///
    /// `sources` lists the distinct sources of the chunks that ended up in
    /// the prompt, in context-block order.
    ///
    /// # Errors
    ///
    /// - [`RagError::UpstreamUnavailable`] after one failed retry.
    /// - [`RagError::ContextTooLarge`] if no truncation satisfies the provider.
    pub async fn generate(&self, query: &str, retrieval: &RetrievalResult) -> Result<AnswerResult> {
        let mut prompt = self.build_prompt(query, retrieval)?;
        loop {
            let attempt = retry_once("complete", || self.llm.complete(&prompt)).await;
            match attempt {
                Ok(response) => {
                    return Ok(AnswerResult {
                        response,
                        sources: prompt.cited_sources(),
                    })
                }
                Err(e @ RagError::ContextTooLarge { .. }) => self.shrink(&mut prompt, e)?,
                Err(e) => return Err(e),
            }
        }
    }

    /// Open a streamed grounded answer.
    ///
    /// Only opening the provider stream is retried. Once a fragment has
    /// been delivered, failures end the stream with an `Err` item.
    ///
    /// # Errors
    ///
    /// Same as [`generate`](Self::generate), for failures before the first
    /// fragment.
    pub async fn generate_stream(
        &self,
        query: &str,
        retrieval: &RetrievalResult,
    ) -> Result<AnswerStream> {
        let mut prompt = self.build_prompt(query, retrieval)?;
        let mut fragments = loop {
            let attempt = retry_once("complete_stream", || self.llm.complete_stream(&prompt)).await;
            match attempt {
                Ok(fragments) => break fragments,
                Err(e @ RagError::ContextTooLarge { .. }) => self.shrink(&mut prompt, e)?,
                Err(e) => return Err(e),
            }
        };
        let sources = prompt.cited_sources();

        let events = async_stream::stream! {
            while let Some(item) = fragments.next().await {
                match item {
                    Ok(content) if content.is_empty() => {}
                    Ok(content) => yield Ok(StreamEvent::Token { content }),
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
            yield Ok(StreamEvent::Done { sources });
        };
        Ok(Box::pin(events))
    }

    fn shrink(&self, prompt: &mut Prompt, rejected: RagError) -> Result<()> {
        if !prompt.drop_lowest_ranked(&self.config.template) {
            return Err(rejected);
        }
        warn!(
            provider = self.llm.name(),
            kept = prompt.context().len(),
            "provider rejected prompt size, dropping lowest-ranked chunk"
        );
        Ok(())
    }
}
