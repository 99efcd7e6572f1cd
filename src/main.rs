use anyhow::Result;
use clap::{Parser, Subcommand};
use ragstudio::db::{Db, SqliteStore};
use ragstudio::pipeline::templates;
use ragstudio::Config;

/// RAG Studio: manage pipeline definitions and check the database.
#[derive(Parser, Debug)]
#[command(name = "ragstudio", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply migrations and verify the database schema (default)
    Verify,
    /// Manage stored pipeline definitions
    #[command(subcommand)]
    Pipelines(PipelinesCommand),
    /// List recent benchmark runs
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
enum PipelinesCommand {
    /// List stored pipelines
    List,
    /// Upsert every `[[pipelines]]` entry from config.toml into the store
    Sync,
    /// List built-in templates
    Templates,
    /// Create a pipeline from a built-in template
    Create {
        /// Template key, e.g. basic_qa
        template: String,
        id: String,
        #[arg(long)]
        index: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Delete a stored pipeline
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    // RUST_LOG wins over [ragstudio] log_level
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.ragstudio.log_level.as_str()),
    )
    .init();
    log::info!("Starting RAG Studio v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Database path: {}", config.db_path().display());

    let store = SqliteStore::open(config.db_path()).await?;

    match cli.command.unwrap_or(Command::Verify) {
        Command::Verify => verify_database_schema(&Db::new(config.db_path())).await?,
        Command::Pipelines(command) => run_pipelines(&config, &store, command).await?,
        Command::Runs { limit } => {
            let runs = store.list_runs(limit).await?;
            if runs.is_empty() {
                println!("No benchmark runs yet");
            }
            for run in runs {
                println!(
                    "{}  {:<10} {:>8.2}s  {}  {}",
                    run.started_at.as_deref().unwrap_or("-"),
                    run.status,
                    run.duration_secs,
                    run.id,
                    run.name
                );
            }
        }
    }

    Ok(())
}

async fn run_pipelines(config: &Config, store: &SqliteStore, command: PipelinesCommand) -> Result<()> {
    match command {
        PipelinesCommand::List => {
            let pipelines = store.list_pipelines().await?;
            if pipelines.is_empty() {
                println!("No pipelines stored. Run `ragstudio pipelines sync` or `ragstudio pipelines create`.");
            }
            for p in pipelines {
                println!("{:<24} {:<7} {:<32} {}", p.id, p.variant, p.name, p.updated_at);
            }
        }
        PipelinesCommand::Sync => {
            for pipeline in &config.pipelines {
                store.save_pipeline(pipeline).await?;
                log::info!("Synced pipeline {} ({})", pipeline.id, pipeline.variant);
            }
            println!("Synced {} pipelines", config.pipelines.len());
        }
        PipelinesCommand::Templates => {
            for t in templates::templates() {
                println!(
                    "{:<18} {:<7} {:<14} {}{}",
                    t.key,
                    t.variant,
                    t.category,
                    t.description,
                    if t.is_default { " (default)" } else { "" }
                );
            }
        }
        PipelinesCommand::Create { template, id, index, name } => {
            let template = templates::template(&template)?;
            let name = name.unwrap_or_else(|| template.name.to_string());
            let pipeline = template.instantiate(&id, &name, &index);
            store.save_pipeline(&pipeline).await?;
            println!("Created pipeline {} from template {}", id, template.key);
        }
        PipelinesCommand::Delete { id } => {
            if store.delete_pipeline(&id).await? {
                println!("Deleted pipeline {}", id);
            } else {
                anyhow::bail!("Pipeline {} not found", id);
            }
        }
    }
    Ok(())
}

/// Verify that all expected database objects exist
async fn verify_database_schema(db: &Db) -> Result<()> {
    use ragstudio::db::migrate;
    use ragstudio::RagstudioError;

    db.with_connection(|conn| {
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let expected_tables = ["benchmark_runs", "pipelines", "schema_migrations"];
        let mut all_tables_exist = true;
        for table in &expected_tables {
            if tables.iter().any(|t| t == table) {
                log::debug!("Table exists: {}", table);
            } else {
                log::error!("Missing table: {}", table);
                all_tables_exist = false;
            }
        }
        if !all_tables_exist {
            return Err(RagstudioError::Config("Not all required tables exist".to_string()));
        }

        let applied = migrate::get_applied_migrations(conn)?;
        log::info!("Applied migrations: {}", applied.join(", "));
        Ok(())
    })
    .await?;

    log::info!("Database schema verified");
    Ok(())
}
