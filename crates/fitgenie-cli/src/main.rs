mod chat_cmds;
mod config;
mod serve_cmd;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use fitgenie_core::store::{ChatStore, PgStore};
use fitgenie_db::pool;

use config::FitgenieConfig;

#[derive(Parser)]
#[command(name = "fitgenie", about = "Conversational fitness plan generator")]
struct Cli {
    /// Database URL (overrides FITGENIE_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a fitgenie config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/fitgenie")]
        db_url: String,
        /// Gemini API key to store in the config file
        #[arg(long)]
        gemini_api_key: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the fitgenie database (requires config file or env vars)
    DbInit,
    /// Serve the chat HTTP API
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
    /// Mint a bearer token for a user
    Token {
        /// User ID (UUID)
        user_id: String,
    },
    /// Print the prompt that would be sent to the model
    Prompt {
        /// JSON file with the user's profile
        #[arg(long)]
        context: Option<PathBuf>,
        /// Chat message (omit to print the system prompt only)
        message: Option<String>,
    },
    /// Send one chat message through the full pipeline
    Ask {
        /// User ID (UUID)
        user_id: String,
        /// Chat message
        message: String,
        /// JSON file with the user's profile
        #[arg(long)]
        context: Option<PathBuf>,
    },
    /// Show a user's recent chat turns, oldest first
    History {
        /// User ID (UUID)
        user_id: String,
        /// Maximum number of turns
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Stored plan management
    Plans {
        #[command(subcommand)]
        command: PlanCommands,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// List a user's plans, newest first
    List {
        /// User ID (UUID)
        user_id: String,
    },
    /// Show one plan
    Show {
        /// User ID (UUID)
        user_id: String,
        /// Plan ID (UUID)
        plan_id: String,
    },
}

/// Execute the `fitgenie init` command: write config file.
fn cmd_init(db_url: &str, gemini_api_key: Option<String>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let token_secret = config::generate_token_secret();
    let has_key = gemini_api_key.is_some();

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
            max_connections: None,
        },
        auth: config::AuthSection {
            token_secret: token_secret.clone(),
        },
        gemini: config::GeminiSection {
            api_key: gemini_api_key,
            model: None,
        },
        pipeline: config::PipelineSection::default(),
        rate_limit: config::RateLimitSection::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  auth.token_secret = {}...{}", &token_secret[..8], &token_secret[56..]);
    if !has_key {
        println!(
            "  gemini.api_key not set; export {} before `fitgenie ask` or `fitgenie serve`",
            config::GEMINI_API_KEY_ENV
        );
    }
    println!();
    println!("Next: run `fitgenie db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `fitgenie db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = FitgenieConfig::resolve(cli_db_url)?;

    println!("Initializing fitgenie database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("fitgenie db-init complete.");
    Ok(())
}

async fn cmd_serve(cli_db_url: Option<&str>, bind: &str, port: u16) -> anyhow::Result<()> {
    let resolved = FitgenieConfig::resolve(cli_db_url)?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    let store: Arc<dyn ChatStore> = Arc::new(PgStore::new(db_pool.clone()));

    let state = serve_cmd::AppState {
        orchestrator: resolved.orchestrator(store)?,
        limiter: Arc::new(resolved.rate_limiter()),
        tokens: resolved.token_config.clone(),
    };
    let result = serve_cmd::run_serve(state, bind, port).await;
    db_pool.close().await;
    result
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            db_url,
            gemini_api_key,
            force,
        } => {
            cmd_init(&db_url, gemini_api_key, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Serve { bind, port } => {
            cmd_serve(cli.database_url.as_deref(), &bind, port).await?;
        }
        Commands::Token { user_id } => {
            let resolved = FitgenieConfig::resolve(cli.database_url.as_deref())?;
            chat_cmds::run_token(&resolved.token_config, &user_id)?;
        }
        Commands::Prompt { context, message } => {
            let context = context
                .as_deref()
                .map(chat_cmds::load_context)
                .transpose()?;
            chat_cmds::run_prompt(context.as_ref(), message.as_deref());
        }
        Commands::Ask {
            user_id,
            message,
            context,
        } => {
            let context = context
                .as_deref()
                .map(chat_cmds::load_context)
                .transpose()?;
            let resolved = FitgenieConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let store: Arc<dyn ChatStore> = Arc::new(PgStore::new(db_pool.clone()));
            let result = match resolved.orchestrator(store) {
                Ok(orchestrator) => {
                    chat_cmds::run_ask(&orchestrator, &user_id, &message, context).await
                }
                Err(e) => Err(e),
            };
            db_pool.close().await;
            result?;
        }
        Commands::History { user_id, limit } => {
            let resolved = FitgenieConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let store = PgStore::new(db_pool.clone());
            let result = chat_cmds::run_history(&store, &user_id, limit).await;
            db_pool.close().await;
            result?;
        }
        Commands::Plans { command } => {
            let resolved = FitgenieConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let store = PgStore::new(db_pool.clone());
            let result = match command {
                PlanCommands::List { user_id } => chat_cmds::run_plans_list(&store, &user_id).await,
                PlanCommands::Show { user_id, plan_id } => {
                    chat_cmds::run_plans_show(&store, &user_id, &plan_id)
                        .await
                        .context("failed to show plan")
                }
            };
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
