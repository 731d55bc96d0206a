use anyhow::Result;

use crate::app::App;

/// `onboard search`: print the top `k` chunks for `query`.
pub async fn run_search(app: &App, query: &str, k: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let k = k.unwrap_or(app.config.retrieval.k);
    let hits = app.pipeline.search(query, k).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let excerpt: String = hit.chunk.text.chars().take(200).collect();
        println!("{}. [{:.3}] {}", i + 1, hit.score, hit.chunk.source_id);
        println!("    chunk: {}", hit.chunk.chunk_index);
        println!("    excerpt: \"{}\"", excerpt.replace('\n', " ").trim());
        println!("    id: {}", hit.chunk.id);
        println!();
    }

    Ok(())
}
