use chrono::Utc;
use clap::{Parser, Subcommand};
use eyre::{Result, WrapErr};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tonecheck::highlight::Suggestion;
use tonecheck::server::{run_server, ServerConfig};
use tonecheck::service::{Analysis, ToxicityService};
use tonecheck::{default_config_path, load_config, render, validate_config, AppConfig};

#[derive(Parser)]
#[command(
    name = "tonecheck",
    version,
    about = "Score text for toxicity and suggest gentler wording."
)]
struct Cli {
    /// Path to the config file (default: ~/.tonecheck/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web front-end
    Serve {
        /// Address to bind to, overriding the config (e.g. "0.0.0.0:5000")
        #[arg(long)]
        bind: Option<String>,
    },

    /// Analyze a single piece of text and print the result as JSON
    Check {
        /// Text to analyze
        #[arg(long)]
        text: String,
    },

    /// Validate the config file and report any issues
    ConfigCheck,
}

#[derive(Serialize)]
struct CheckResult {
    status: &'static str,
    display: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    highlighted_html: Option<String>,
    suggestions: Vec<Suggestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    model_hash: String,
    timestamp: String,
}

fn config_path(cli_path: Option<PathBuf>) -> PathBuf {
    cli_path.unwrap_or_else(default_config_path)
}

async fn cmd_serve(config: AppConfig, bind: Option<String>) -> Result<()> {
    let mut server_config = ServerConfig::from_app_config(&config)?;
    if let Some(bind) = bind {
        server_config.bind_addr = bind
            .parse()
            .wrap_err_with(|| format!("invalid bind address '{bind}'"))?;
    }

    let service = ToxicityService::from_config(&config)?;
    run_server(server_config, service).await
}

fn cmd_check(config: AppConfig, text: String) -> Result<()> {
    let service = ToxicityService::from_config(&config)?;
    let analysis = service.analyze(&text);

    let mut result = CheckResult {
        status: "scored",
        display: analysis.message(),
        label: None,
        confidence: None,
        highlighted_html: None,
        suggestions: Vec::new(),
        error: None,
        model_hash: service.model_hash(),
        timestamp: Utc::now().to_rfc3339(),
    };
    match analysis {
        Analysis::Blank => result.status = "blank",
        Analysis::Scored {
            verdict,
            annotation,
        } => {
            result.label = Some(verdict.label.to_string());
            result.confidence = Some(verdict.confidence);
            result.highlighted_html = Some(render::annotated_html(&annotation));
            result.suggestions = annotation.suggestions;
        }
        Analysis::Failed { reason } => {
            result.status = "failed";
            result.error = Some(reason);
        }
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn cmd_config_check(path: PathBuf) -> Result<()> {
    println!("Config path: {}", path.display());

    if !path.exists() {
        println!("No config file found. Using defaults.");
    } else {
        let content = fs::read_to_string(&path).wrap_err("failed to read config file")?;
        if let Err(e) = toml::from_str::<AppConfig>(&content) {
            eprintln!("ERROR: failed to parse config: {}", e);
            return Ok(());
        }
        println!("Config file parsed successfully.");
    }

    let config = load_config(&path)?;
    let issues = validate_config(&config);
    if issues.is_empty() {
        println!("All checks passed.");
    } else {
        for issue in &issues {
            println!("  {}", issue);
        }
        println!("\n{} issue(s) found.", issues.len());
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tonecheck=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let path = config_path(cli.config);

    let result = match cli.command {
        Commands::ConfigCheck => cmd_config_check(path),
        Commands::Serve { bind } => match load_config(&path) {
            Ok(config) => cmd_serve(config, bind).await,
            Err(e) => Err(e),
        },
        Commands::Check { text } => load_config(&path).and_then(|config| cmd_check(config, text)),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:?}");
        std::process::exit(1);
    }
}
