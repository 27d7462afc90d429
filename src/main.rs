use askdb::config::EngineConfig;
use askdb::engine::{AnswerResponse, QueryResponse, TextToSqlEngine};
use askdb::prompt::render_table;
use askdb::schema::Record;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "askdb")]
#[command(about = "Ask questions about a PostgreSQL database in plain language")]
#[command(version)]
struct Args {
    /// Schema snapshot (or set SCHEMA_PATH)
    #[arg(long, global = true)]
    schema: Option<PathBuf>,

    /// Rule list document (or set RULES_PATH)
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    /// Business context document (or set BUSINESS_CONTEXT_PATH)
    #[arg(long, global = true)]
    context: Option<PathBuf>,

    /// Database URL (or set DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// API key (or set LLM_API_KEY / OPENAI_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Model name (or set LLM_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Print responses as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question: generate SQL, run it, summarize the result
    Ask {
        question: String,

        /// Also print the generated SQL
        #[arg(long)]
        show_sql: bool,
    },
    /// Generate SQL for a question, optionally running it
    Generate {
        question: String,

        #[arg(short, long)]
        execute: bool,
    },
    /// Run a SELECT statement directly
    Execute { sql: String },
    /// Show what the schema snapshot contains
    SchemaInfo {
        /// Full per-table summary instead of the table list
        #[arg(long)]
        summary: bool,
    },
    /// Check the database connection and schema
    Health,
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = EngineConfig::from_env()?;
    if let Some(path) = &args.schema {
        config.schema_path = path.clone();
    }
    if let Some(path) = &args.rules {
        config.rules_path = path.clone();
    }
    if let Some(path) = &args.context {
        config.business_context_path = path.clone();
    }
    if let Some(url) = &args.database_url {
        config.database.url = Some(url.clone());
    }
    if let Some(key) = &args.api_key {
        config.llm.api_key = key.clone();
    }
    if let Some(model) = &args.model {
        config.llm.model = model.clone();
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_rows(columns: &[String], data: Option<&[Record]>, row_count: usize) {
    println!("Rows returned: {}\n", row_count);
    match data {
        Some(rows) if !rows.is_empty() => println!("{}", render_table(columns, rows)),
        _ => println!("No results found."),
    }
}

fn print_query(response: &QueryResponse) {
    println!("{}", "=".repeat(80));
    println!("QUERY RESULTS");
    println!("{}", "=".repeat(80));

    if !response.success {
        println!("Error: {}", response.error.as_deref().unwrap_or("unknown error"));
        return;
    }

    if let Some(sql) = &response.sql {
        println!("\nSQL Query:\n{}\n", sql);
    }
    if response.pending_execution {
        println!("Not executed. Re-run with --execute to fetch rows.");
    } else {
        print_rows(&response.columns, response.data.as_deref(), response.row_count);
    }
    println!("\n{}", "=".repeat(80));
}

fn print_answer(answer: &AnswerResponse, show_sql: bool) {
    if show_sql {
        if let Some(sql) = &answer.sql {
            println!("SQL:\n{}\n", sql);
        }
    }

    if let Some(narrative) = &answer.narrative {
        println!("{}\n", narrative);
    }

    if !answer.success {
        println!("Error: {}", answer.error.as_deref().unwrap_or("unknown error"));
        return;
    }

    print_rows(&answer.columns, answer.data.as_deref(), answer.row_count);

    if let Some(chart) = &answer.chart {
        println!(
            "\nSuggested chart: {} (x: {}, y: {})",
            chart.chart_type.map(|t| t.to_string()).unwrap_or_default(),
            chart.x_axis.as_deref().unwrap_or("-"),
            chart.y_axis.as_deref().unwrap_or("-"),
        );
        if let Some(explanation) = &chart.explanation {
            println!("{}", explanation);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    info!("Schema: {}", config.schema_path.display());

    let mut engine = TextToSqlEngine::from_config(&config)
        .with_context(|| format!("Failed to initialize engine from {}", config.schema_path.display()))?;

    let outcome = run(&args, &mut engine).await;
    engine.close().await;

    if let Err(e) = &outcome {
        error!("{:#}", e);
    }
    outcome
}

async fn run(args: &Args, engine: &mut TextToSqlEngine) -> Result<()> {
    match &args.command {
        Commands::Ask { question, show_sql } => {
            let answer = engine.ask(question).await;
            if args.json {
                print_json(&answer)?;
            } else {
                print_answer(&answer, *show_sql);
            }
        }
        Commands::Generate { question, execute } => {
            let response = engine.query(question, *execute).await;
            if args.json {
                print_json(&response)?;
            } else {
                print_query(&response);
            }
        }
        Commands::Execute { sql } => {
            let result = engine.execute(sql).await;
            if args.json {
                print_json(&result)?;
            } else if result.success {
                print_rows(&result.columns, result.data.as_deref(), result.row_count);
            } else {
                println!("Error: {}", result.error.as_deref().unwrap_or("unknown error"));
            }
        }
        Commands::SchemaInfo { summary } => {
            if *summary {
                println!("{}", engine.schema().summary());
            } else if args.json {
                print_json(&engine.schema_info())?;
            } else {
                let info = engine.schema_info();
                println!("Database: {}", info.metadata.database.as_deref().unwrap_or("unknown"));
                println!("Total tables: {}", info.total_tables);
                for table in &info.tables {
                    println!("  - {}", table);
                }
            }
        }
        Commands::Health => {
            let report = engine.health().await;
            if args.json {
                print_json(&report)?;
            } else {
                println!("Status: {:?}", report.status);
                println!("Database connected: {}", report.database_connected);
                println!("Schema loaded: {}", report.schema_loaded);
            }
        }
    }
    Ok(())
}
