//! Grounded prompt construction.
//!
//! A [`Prompt`] is always assembled in the same order: system instruction,
//! context block, user question. The context block lists retrieved chunks
//! in retrieval order (highest similarity first), each tagged with its
//! source URL:
//!
//! ```text
//! [Source 1] Cameras
//! URL: https://example.com/cameras
//! We rent Sony A7S III cameras.
//!
//! ---
//!
//! [Source 2] ...
//! ```
//!
//! With no chunks the prompt switches to the context-free fallback
//! instruction, which asks the model to say it lacks the information
//! instead of guessing.

use serde::{Deserialize, Serialize};

use crate::chunk::count_tokens;
use crate::models::{distinct_sources, Chunk};

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Business-specific wording for the system instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub business_name: String,
    /// How customers should reach a human (e.g. a phone number or "the store").
    pub contact: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            business_name: "our rental service".to_string(),
            contact: "our team".to_string(),
        }
    }
}

impl PromptTemplate {
    /// The phrase the model is told to use when the context falls short.
    pub fn insufficient_information(&self) -> String {
        format!(
            "I don't have that specific information, but you can reach {} for details.",
            self.contact
        )
    }

    /// System instruction with grounding rules.
    pub fn system_instruction(&self) -> String {
        format!(
            "You are the friendly and knowledgeable customer service assistant for {name}, \
             a photography and video equipment rental business.\n\
             \n\
             ## Guidelines\n\
             1. Use ONLY the provided context to answer. Do not make up equipment, prices, or policies.\n\
             2. Cite the source URL of every passage you rely on.\n\
             3. If the context does not contain the answer, say: \"{fallback}\"\n\
             4. Keep responses concise but complete.\n\
             5. Mention relevant policies (ID required, security deposit) when discussing bookings.",
            name = self.business_name,
            fallback = self.insufficient_information(),
        )
    }

    /// Instruction used when retrieval produced no context at all.
    pub fn fallback_instruction(&self) -> String {
        format!(
            "You are the customer service assistant for {name}. No information relevant to the \
             customer's question was found in the knowledge base. Do not answer from general \
             knowledge. Reply only: \"{fallback}\"",
            name = self.business_name,
            fallback = self.insufficient_information(),
        )
    }
}

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One chat message handed to a completion provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// A fully assembled generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    system: String,
    context: Vec<Chunk>,
    question: String,
    insufficient: String,
}

impl Prompt {
    /// Assemble a prompt from ranked chunks. An empty `context` selects the
    /// fallback instruction.
    pub fn build(template: &PromptTemplate, question: &str, context: Vec<Chunk>) -> Self {
        let system = if context.is_empty() {
            template.fallback_instruction()
        } else {
            template.system_instruction()
        };
        Self {
            system,
            context,
            question: question.to_string(),
            insufficient: template.insufficient_information(),
        }
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    /// The reply the model is instructed to give when context falls short.
    pub fn insufficient_information(&self) -> &str {
        &self.insufficient
    }

    /// Chunks in the context block, highest-ranked first.
    pub fn context(&self) -> &[Chunk] {
        &self.context
    }

    pub fn has_context(&self) -> bool {
        !self.context.is_empty()
    }

    /// Distinct sources of the chunks in the context block, first-seen order.
    ///
    /// This is an approximation of attribution: it lists what the model was
    /// shown, not what it actually drew on.
    pub fn cited_sources(&self) -> Vec<String> {
        distinct_sources(&self.context)
    }

    /// Render the context block.
    pub fn context_block(&self) -> String {
        self.context
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let mut header = format!("[Source {}]", i + 1);
                if !chunk.title.is_empty() {
                    header.push(' ');
                    header.push_str(&chunk.title);
                }
                format!("{}\nURL: {}\n{}", header, chunk.source, chunk.text)
            })
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR)
    }

    /// The user turn: context block (if any) followed by the question.
    pub fn user_message(&self) -> String {
        if self.context.is_empty() {
            format!("Question: {}", self.question)
        } else {
            format!("Context:\n{}\n\nQuestion: {}", self.context_block(), self.question)
        }
    }

    /// System and user messages, in that order.
    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: Role::System,
                content: self.system.clone(),
            },
            ChatMessage {
                role: Role::User,
                content: self.user_message(),
            },
        ]
    }

    /// Whitespace-token size of the rendered prompt.
    pub fn token_estimate(&self) -> usize {
        count_tokens(&self.system) + count_tokens(&self.user_message())
    }

    /// Drop the lowest-ranked context chunk. Returns `false` if there was
    /// nothing to drop.
    pub fn drop_lowest_ranked(&mut self, template: &PromptTemplate) -> bool {
        if self.context.pop().is_none() {
            return false;
        }
        if self.context.is_empty() {
            self.system = template.fallback_instruction();
        }
        true
    }
}
