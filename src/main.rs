use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use care_quality_engine::{
    config::{Config, LogFormat},
    generator::LangbaseGenerator,
    notifications::NotificationMessage,
    storage::{SqliteStorage, UserType},
    Engine,
};

/// Care visit scoring, weekly trends and report generation.
#[derive(Parser, Debug)]
#[command(name = "care-quality-engine", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upsert the built-in checklist catalog
    SeedCatalog,

    /// Generate the report of a completed visit
    Generate {
        /// Visit ID
        #[arg(long)]
        visit: String,
        /// Acting user ID
        #[arg(long)]
        actor: String,
    },

    /// Score a visit's checklist without generating a report
    Score {
        /// Visit ID
        #[arg(long)]
        visit: String,
    },

    /// Regenerate an existing report in place
    Regenerate {
        /// Report ID
        #[arg(long)]
        report: String,
        /// Acting user ID
        #[arg(long)]
        actor: String,
    },

    /// Recompute the weekly record containing a date
    Weekly {
        /// Recipient ID
        #[arg(long)]
        recipient: String,
        /// Any date in the week (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Show stored weekly records of recent weeks
    WeeklyHistory {
        /// Recipient ID
        #[arg(long)]
        recipient: String,
        /// Number of weeks including the current one
        #[arg(long, default_value = "4")]
        weeks: u32,
    },

    /// Show the most frequent report keywords
    TrendingKeywords {
        /// Acting user ID (must be an admin)
        #[arg(long)]
        actor: String,
        /// Look-back window in days
        #[arg(long, default_value = "7")]
        days: u32,
        /// Maximum number of keywords
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Show a recipient's most recent special notes
    SpecialNotes {
        /// Recipient ID
        #[arg(long)]
        recipient: String,
        /// Maximum number of notes
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Send a notification to all active users, optionally of one type
    Broadcast {
        /// Acting user ID (must be an admin)
        #[arg(long)]
        actor: String,
        /// Notification type
        #[arg(long = "type", default_value = "announcement")]
        notification_type: String,
        /// Notification title
        #[arg(long)]
        title: String,
        /// Notification body
        #[arg(long)]
        content: String,
        /// Restrict to caregiver, guardian or admin
        #[arg(long)]
        user_type: Option<UserType>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "Care quality engine starting");

    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            Arc::new(s)
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    let generator = match LangbaseGenerator::new(&config.generator, config.request.clone()) {
        Ok(g) => Arc::new(g),
        Err(e) => {
            error!(error = %e, "Failed to initialize content generator");
            return Err(e.into());
        }
    };

    let engine = Engine::new(config, storage, generator)?;

    if let Err(e) = run(&engine, cli.command).await {
        error!(error = %e, "Command failed");
        return Err(e);
    }

    Ok(())
}

async fn run(engine: &Engine, command: Command) -> anyhow::Result<()> {
    match command {
        Command::SeedCatalog => {
            let written = engine.seed_catalog().await?;
            print_json(&serde_json::json!({ "questions": written }))
        }
        Command::Generate { visit, actor } => {
            print_json(&engine.orchestrator.generate_report(&visit, &actor).await?)
        }
        Command::Score { visit } => print_json(&engine.orchestrator.score_visit(&visit).await?),
        Command::Regenerate { report, actor } => {
            print_json(&engine.orchestrator.regenerate_report(&report, &actor).await?)
        }
        Command::Weekly { recipient, date } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            print_json(&engine.weekly.refresh(&recipient, date).await?)
        }
        Command::WeeklyHistory { recipient, weeks } => {
            print_json(&engine.weekly.recent(&recipient, weeks).await?)
        }
        Command::TrendingKeywords { actor, days, limit } => {
            let keywords = engine.orchestrator.trending_keywords(&actor, days, limit).await?;
            print_json(&serde_json::json!({ "period_days": days, "trending_keywords": keywords }))
        }
        Command::SpecialNotes { recipient, limit } => {
            print_json(&engine.orchestrator.special_notes(&recipient, limit).await?)
        }
        Command::Broadcast {
            actor,
            notification_type,
            title,
            content,
            user_type,
        } => {
            let message = NotificationMessage::new(notification_type, title, content);
            print_json(&engine.orchestrator.broadcast(&actor, user_type, &message).await?)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
