use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use aql_assistant::cache::TranslationCache;
use aql_assistant::config::Settings;
use aql_assistant::preprocess;
use aql_assistant::session::{QueryPipeline, SessionStatus};
use aql_assistant::translator::provider_for;
use aql_assistant::validator::{AqlValidatorClient, Validator};

#[derive(Parser)]
#[command(name = "aql-assistant")]
#[command(about = "Translate natural language questions into validated AQL queries")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a question into AQL, validating and repairing the result
    Ask {
        /// Natural language question
        question: String,

        /// LLM provider: openai, claude, ollama or auto
        #[arg(short, long)]
        provider: Option<String>,

        /// AQL server address (host or host:port)
        #[arg(short, long)]
        server: Option<String>,

        /// Maximum repair attempts
        #[arg(long)]
        max_attempts: Option<usize>,

        /// Path to the translation cache database
        #[arg(long)]
        cache_path: Option<std::path::PathBuf>,
    },
    /// Validate a raw AQL query against the service
    Validate {
        /// AQL query text
        query: String,

        /// AQL server address (host or host:port)
        #[arg(short, long)]
        server: Option<String>,
    },
    /// Print a query after date substitution and limit injection
    Preprocess {
        /// AQL query text
        query: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    match args.command {
        Commands::Ask { question, provider, server, max_attempts, cache_path } => {
            let mut settings = Settings::from_env();
            if let Some(provider) = provider {
                settings.provider = provider;
            }
            if let Some(server) = server {
                settings.server = server;
            }
            if let Some(max_attempts) = max_attempts {
                settings.max_attempts = max_attempts;
            }
            ask(&settings, &question, cache_path).await
        }
        Commands::Validate { query, server } => {
            let mut settings = Settings::from_env();
            if let Some(server) = server {
                settings.server = server;
            }
            validate(&settings, &query).await
        }
        Commands::Preprocess { query } => {
            let settings = Settings::from_env();
            let prepared = preprocess::preprocess(
                &query,
                chrono::Local::now().date_naive(),
                settings.row_limit,
            );
            println!("{}", prepared.query);
            for warning in prepared.warnings {
                eprintln!("warning: {}", warning);
            }
            Ok(())
        }
    }
}

async fn ask(
    settings: &Settings,
    question: &str,
    cache_path: Option<std::path::PathBuf>,
) -> Result<()> {
    let translator = provider_for(settings);
    let validator = Arc::new(AqlValidatorClient::new(
        settings.server.clone(),
        settings.endpoint.clone(),
        settings.username.clone(),
        settings.password.clone(),
        settings.validate_timeout_secs,
    ));

    let mut pipeline = QueryPipeline::new(translator, validator, settings);
    if let Some(path) = cache_path {
        pipeline = pipeline.with_cache(Arc::new(TranslationCache::open(path)?));
    }

    info!("processing question: {}", question);
    let result = pipeline.answer(question).await?;

    println!("\n{}", "=".repeat(70));
    println!(" QUESTION: {}", result.question);
    println!("{}", "=".repeat(70));

    if let Some(translation) = &result.translation {
        println!("\n Understanding: {}", translation.understanding);
        println!(" Provider: {}{}", translation.provider, if result.cache_hit { " (cached)" } else { "" });
        println!(" Explanation: {}", translation.explanation);
    }

    println!("\n Final query:\n{}", result.session.current_query);

    if !result.session.attempts.is_empty() {
        println!("\n Repair attempts:");
        for attempt in &result.session.attempts {
            let verdict = if attempt.outcome.valid { "valid" } else { "invalid" };
            println!("  {}. [{}] {}", attempt.index, verdict, attempt.explanation);
        }
    }

    for warning in &result.warnings {
        println!(" warning: {}", warning);
    }

    let status = match result.session.status {
        SessionStatus::Valid => "VALID",
        SessionStatus::Fixing => "FIXING",
        SessionStatus::Failed => "FAILED",
    };
    println!("\n Status: {} - {}", status, result.session.message);

    Ok(())
}

async fn validate(settings: &Settings, query: &str) -> Result<()> {
    let validator = AqlValidatorClient::new(
        settings.server.clone(),
        settings.endpoint.clone(),
        settings.username.clone(),
        settings.password.clone(),
        settings.validate_timeout_secs,
    );

    let outcome = validator.validate(query).await?;
    if outcome.valid {
        println!("Query is valid");
    } else {
        println!(
            "Query is invalid: {}",
            outcome.message.as_deref().unwrap_or("unknown validation error")
        );
        if let Some(detail) = outcome.detail {
            if let Some(token) = detail.token {
                println!("  at token: {}", token);
            }
            if !detail.expecting.is_empty() {
                println!("  expecting: {}", detail.expecting.join(", "));
            }
        }
    }
    Ok(())
}
