//! `rag search`: retrieval only, printing the ranked chunks a question
//! would be answered from.

use anyhow::Result;

use crate::config::Config;
use crate::engine::open_engine;

pub async fn run_search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let engine = open_engine(config).await?;
    let retrieval = engine.retrieve(query, k).await?;

    if retrieval.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in retrieval.items().iter().enumerate() {
        let title = if hit.chunk.title.is_empty() {
            "(untitled)"
        } else {
            hit.chunk.title.as_str()
        };
        println!("{}. [{:.2}] {}", i + 1, hit.score, title);
        println!("    source: {}", hit.chunk.source);
        println!(
            "    chunk: {} ({} tokens)",
            hit.chunk.sequence_index, hit.chunk.token_count
        );
        println!("    excerpt: \"{}\"", excerpt(&hit.chunk.text, 30));
        println!("    id: {}", hit.id);
        println!();
    }
    Ok(())
}

/// First `words` tokens of `text`, with an ellipsis when cut.
fn excerpt(text: &str, words: usize) -> String {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() <= words {
        tokens.join(" ")
    } else {
        format!("{} ...", tokens[..words].join(" "))
    }
}
