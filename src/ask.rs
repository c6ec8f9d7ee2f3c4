//! `rag ask`: answer one question from the terminal.
//!
//! With `--stream` fragments are written to stdout as they arrive, which
//! is how the chat widget receives them over SSE.

use anyhow::Result;
use futures::StreamExt;
use std::io::Write;

use rental_rag_core::models::StreamEvent;

use crate::config::Config;
use crate::engine::open_engine;

pub async fn run_ask(config: &Config, question: &str, k: Option<usize>, stream: bool) -> Result<()> {
    let engine = open_engine(config).await?;

    let sources = if stream {
        let mut answer = engine.answer_stream(question, k).await?;
        let mut stdout = std::io::stdout();
        let mut sources = Vec::new();
        while let Some(event) = answer.next().await {
            match event? {
                StreamEvent::Token { content } => {
                    write!(stdout, "{}", content)?;
                    stdout.flush()?;
                }
                StreamEvent::Done { sources: cited } => sources = cited,
            }
        }
        println!();
        sources
    } else {
        let answer = engine.answer(question, k).await?;
        println!("{}", answer.response);
        answer.sources
    };

    if !sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &sources {
            println!("  - {}", source);
        }
    }
    Ok(())
}
