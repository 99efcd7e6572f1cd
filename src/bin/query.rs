//! Run one query through a stored pipeline and print the answer with diagnostics.

use clap::Parser;
use ragstudio::pipeline::PipelineConfigProvider;
use ragstudio::types::{Query, QueryStatus};
use ragstudio::{AppContext, Config};

#[derive(Parser, Debug)]
#[command(name = "query")]
struct Args {
    /// Stored pipeline id
    pipeline: String,

    /// Question to ask
    text: String,

    /// Override the pipeline's top-k
    #[arg(long)]
    top_k: Option<usize>,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.text.trim().is_empty() {
        anyhow::bail!("Query cannot be empty");
    }

    let config = Config::load()?;
    // RUST_LOG wins over [ragstudio] log_level
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.ragstudio.log_level.as_str()),
    )
    .init();

    let ctx = AppContext::new(config).await?;
    let pipeline_config = ctx.store.pipeline_config(&args.pipeline).await?;
    let instance = ctx.registry.get(&args.pipeline, pipeline_config).await?;

    let mut query = Query::new(args.text.clone());
    if let Some(top_k) = args.top_k {
        query = query.with_top_k(top_k);
    }

    let result = instance.process(&query).await;
    ctx.shutdown().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("\nQuery: \"{}\"", result.query_text);
    println!("Pipeline: {} ({})\n", instance.id(), result.metadata.pipeline_variant);
    println!("{}\n", result.answer);

    if !result.chunks.is_empty() {
        println!("Sources:");
        for (rank, chunk) in result.chunks.iter().enumerate() {
            let preview: String = chunk.text.chars().take(120).collect();
            let ellipsis = if chunk.text.chars().count() > 120 { "..." } else { "" };
            println!(
                "  #{} {} [chunk {}] (score: {:.3})\n     {}{}",
                rank + 1,
                if chunk.title.is_empty() { &chunk.document_id } else { &chunk.title },
                chunk.chunk_index,
                chunk.score,
                preview,
                ellipsis
            );
        }
        println!();
    }

    let meta = &result.metadata;
    println!("Path: {}", meta.execution_path.join(" -> "));
    if let Some(analysis) = &meta.analysis {
        println!("Analysis: {}", analysis.summary());
    }
    if meta.search_queries.len() > 1 {
        println!("Search queries: {}", meta.search_queries.join(" | "));
    }
    println!(
        "Chunks: {} retrieved, {} after filtering, {} used",
        meta.retrieved_count, meta.filtered_count, meta.final_count
    );
    if meta.refinement_applied {
        println!("Answer was refined");
    }
    if !meta.degraded_nodes.is_empty() {
        println!("Fallbacks used in: {}", meta.degraded_nodes.join(", "));
    }
    println!("Latency: {}ms", result.latency_ms);

    if meta.status == QueryStatus::Failed {
        anyhow::bail!(
            "Query failed: {}",
            meta.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
