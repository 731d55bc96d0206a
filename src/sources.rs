use anyhow::Result;
use std::collections::BTreeMap;

use crate::app::App;

/// `onboard sources`: loaded documents with their chunk counts.
pub fn list_sources(app: &App) -> Result<()> {
    let documents = app.pipeline.documents();
    if documents.is_empty() {
        println!(
            "No documents found in {}",
            app.config.knowledge_dir().display()
        );
        return Ok(());
    }

    let mut per_source: BTreeMap<&str, usize> = BTreeMap::new();
    for chunk in app.pipeline.chunks() {
        *per_source.entry(chunk.source_id.as_str()).or_default() += 1;
    }

    println!("{:<60} {:>8} {:>8}", "DOCUMENT", "CHARS", "CHUNKS");
    for doc in documents {
        println!(
            "{:<60} {:>8} {:>8}",
            doc.source_id,
            doc.content.chars().count(),
            per_source.get(doc.source_id.as_str()).copied().unwrap_or(0)
        );
    }
    Ok(())
}

/// `onboard tools`: registered tools and what they are for.
pub fn list_tools(app: &App) -> Result<()> {
    println!("{:<24} DESCRIPTION", "TOOL");
    for tool in app.tools.tools() {
        println!("{:<24} {}", tool.name(), tool.description());
    }
    Ok(())
}

/// `onboard index`: build the index now and report its size.
pub async fn run_index(app: &App) -> Result<()> {
    let index = app.pipeline.build_index().await?;
    println!("Agent:      {}", app.config.agent.name);
    println!("Knowledge:  {}", app.config.knowledge_dir().display());
    println!("Documents:  {}", app.pipeline.documents().len());
    println!("Chunks:     {}", index.len());
    println!("Embeddings: {}", index.model());
    Ok(())
}
