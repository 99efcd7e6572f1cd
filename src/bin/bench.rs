//! Benchmark CLI: run a test-case set against stored pipelines and compare them.

use clap::Parser;
use ragstudio::benchmark::{testcases, BenchmarkParams, BenchmarkRequest, BenchmarkStatus, ExecutionMode};
use ragstudio::report::{self, ExportFormat};
use ragstudio::{AppContext, Config};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bench")]
struct Args {
    /// Pipeline ids to benchmark, comma separated
    #[arg(long, value_delimiter = ',', required = true)]
    pipelines: Vec<String>,

    /// JSON array of test cases
    #[arg(long, conflicts_with = "generate")]
    cases: Option<PathBuf>,

    /// Generate this many test cases instead of loading a file
    #[arg(long)]
    generate: Option<usize>,

    /// Categories for generated cases, comma separated
    #[arg(long, value_delimiter = ',')]
    categories: Vec<String>,

    #[arg(long, default_value = "benchmark")]
    name: String,

    #[arg(long, default_value_t = 1)]
    iterations: u32,

    /// Defaults to [benchmark] warmup_queries
    #[arg(long)]
    warmup: Option<usize>,

    /// Per-pipeline budget; defaults to [benchmark] timeout_secs, 0 disables
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Run up to N queries at once per pipeline
    #[arg(long)]
    concurrency: Option<usize>,

    #[arg(long)]
    top_k: Option<usize>,

    #[arg(long, value_enum, default_value = "table")]
    format: ExportFormat,

    /// Write the report here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Don't persist the run
    #[arg(long)]
    no_save: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load()?;
    // RUST_LOG wins over [ragstudio] log_level
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.ragstudio.log_level.as_str()),
    )
    .init();

    let test_cases = match (&args.cases, args.generate) {
        (Some(path), _) => testcases::load(path)
            .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", path.display(), e))?,
        (None, Some(count)) => {
            let count = testcases::capped_count(count, config.benchmark.max_queries);
            testcases::generate(count, &args.categories)?
        }
        (None, None) => anyhow::bail!("Pass --cases <file> or --generate <count>"),
    };

    let timeout_secs = args.timeout_secs.unwrap_or(config.benchmark.timeout_secs);
    let params = BenchmarkParams {
        iterations: args.iterations,
        warmup_queries: args.warmup.unwrap_or(config.benchmark.warmup_queries),
        timeout_ms: (timeout_secs > 0).then(|| timeout_secs * 1000),
        top_k: args.top_k,
        mode: match args.concurrency {
            Some(max_in_flight) => ExecutionMode::Concurrent { max_in_flight },
            None => ExecutionMode::Sequential,
        },
    };
    let request = BenchmarkRequest::new(args.name.clone(), args.pipelines.clone(), test_cases)
        .with_params(params);

    println!(
        "Running benchmark {} on {} cases x {} pipelines\n",
        request.id,
        request.test_cases.len(),
        request.pipeline_ids.len()
    );

    let ctx = AppContext::new(config).await?;
    let run = ctx.runner.run(request).await?;
    ctx.shutdown().await;

    if !args.no_save {
        ctx.store.save_run(&run).await?;
        log::info!("Saved benchmark run {}", run.id);
    }

    let rendered = report::render(&run, args.format)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, rendered)?;
            println!("Report written to {}", path.display());
        }
        None => println!("{}", rendered),
    }

    if run.status == BenchmarkStatus::Failed {
        anyhow::bail!(
            "Benchmark failed: {}",
            run.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
