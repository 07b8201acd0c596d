//! KeyRouter binary
//!
//! Runs one CLI report against the provider catalog and state file, or
//! starts the Axum hook server.

use clap::Parser;
use keyrouter::{
    cli::{Cli, Command, generate_config_template},
    config::Config,
    error::{AppError, AppResult},
    handlers::{self, AppState},
    normalizer::parse_command_input,
    router::format_decision,
    shared::{Workflow, format_retry_advice},
    state::{summarize_quota, summarize_usage},
    telemetry,
};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Handle config subcommand (doesn't need a loaded config)
    if let Some(Command::Config { output }) = &cli.command {
        return write_template(output.as_deref());
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    telemetry::init(&config.observability.log_level);

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// An explicit `--config` must exist; the default path may be absent
fn load_config(cli: &Cli) -> AppResult<Config> {
    if cli.uses_default_config() {
        Config::from_file_or_default(&cli.config)
    } else {
        Config::from_file(&cli.config)
    }
}

fn write_template(output: Option<&str>) -> ExitCode {
    let template = generate_config_template();
    match output {
        Some(path) => match std::fs::write(path, template) {
            Ok(()) => {
                eprintln!("Configuration template written to {path}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: failed to write {path}: {e}");
                ExitCode::FAILURE
            }
        },
        None => {
            print!("{template}");
            ExitCode::SUCCESS
        }
    }
}

async fn run(command: Option<Command>, config: Config) -> AppResult<()> {
    let command = match command {
        None | Some(Command::Serve) => return serve(config).await,
        Some(command) => command,
    };

    let workflow = Workflow::from_config(&config)?;
    let report = match command {
        Command::Audit => workflow.audit_report(),
        Command::Route { input } => {
            let decision = workflow.route_and_record(&parse_command_input(&input));
            format_decision(&decision)
        }
        Command::Retry { error } => format_retry_advice(&workflow.advise_retry(&error)),
        Command::Usage => summarize_usage(&workflow.ledger().state()),
        Command::Quota => summarize_quota(&workflow.ledger().state()),
        Command::QuotaSet {
            model_key,
            remaining,
            reset_at,
        } => {
            workflow.set_quota_from_args(&model_key, &remaining, reset_at.as_deref())?;
            format!("Quota updated for {}", model_key.trim())
        }
        Command::Config { .. } | Command::Serve => return Ok(()),
    };

    println!("{report}");
    Ok(())
}

async fn serve(config: Config) -> AppResult<()> {
    let config = Arc::new(config);
    let state = AppState::from_config(config.clone())?;
    let app = handlers::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to bind {addr}: {e}")))?;

    tracing::info!(
        addr = %addr,
        enabled = config.routing.enabled,
        hard_apply = config.hard_apply.enabled,
        "KeyRouter hook server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("KeyRouter hook server shutting down");
        })
        .await
        .map_err(|e| AppError::Internal(format!("Server error: {e}")))
}
