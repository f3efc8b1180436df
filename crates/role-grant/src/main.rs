//! Role Grant runner
//!
//! Reads one job envelope from stdin, dispatches it and writes the JSON
//! result to stdout. Logs go to stderr.
//!
//! Exit codes: `0` success, `1` the job raised an error, `2` the runner could
//! not start or read its input.

use common::config::LogFormat;
use role_grant::config::Config;
use role_grant::handlers::JobHandler;
use role_grant::models::JobEnvelope;
use role_grant::services::HaltSignal;
use role_grant::ErrorReport;
use std::process::ExitCode;
use tokio::io::AsyncReadExt;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const EXIT_JOB_ERROR: u8 = 1;
const EXIT_SETUP_ERROR: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            // Tracing is configured from the same variables, so report directly
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::from(EXIT_SETUP_ERROR);
        }
    };

    init_tracing(&config);

    info!(
        default_base_url = %config.default_base_url,
        http_timeout_seconds = config.http_timeout.as_secs(),
        "Configuration loaded"
    );

    let handler = match JobHandler::new(&config) {
        Ok(handler) => handler,
        Err(e) => {
            error!("Failed to create job handler: {}", e);
            return ExitCode::from(EXIT_SETUP_ERROR);
        }
    };

    let envelope = match read_envelope().await {
        Ok(envelope) => envelope,
        Err(e) => {
            error!("Failed to read job envelope: {}", e);
            return ExitCode::from(EXIT_SETUP_ERROR);
        }
    };

    tokio::spawn(halt_on_signal(handler.halt_signal()));

    match handler.dispatch(envelope).await {
        Ok(response) => {
            println!("{response}");
            ExitCode::SUCCESS
        }
        Err(report) => {
            println!("{}", error_body(&report));
            ExitCode::from(EXIT_JOB_ERROR)
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.observability.log_filter)
        .unwrap_or_else(|_| EnvFilter::new(common::config::DEFAULT_LOG_FILTER));

    let registry = tracing_subscriber::registry().with(filter);
    match config.observability.log_format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

async fn read_envelope() -> Result<JobEnvelope, Box<dyn std::error::Error>> {
    let mut input = String::new();
    tokio::io::stdin().read_to_string(&mut input).await?;
    Ok(serde_json::from_str(&input)?)
}

fn error_body(report: &ErrorReport) -> serde_json::Value {
    let kind = report.classify();
    let mut body = serde_json::json!({
        "message": report.message,
        "kind": kind,
        "retryable": kind.is_retryable(),
    });
    if let (Some(code), Some(fields)) = (report.status_code, body.as_object_mut()) {
        fields.insert("statusCode".to_string(), code.into());
    }
    serde_json::json!({ "error": body })
}

/// Fires the halt signal on SIGINT or SIGTERM.
///
/// The current phase finishes; no further directory call is started.
async fn halt_on_signal(halt: HaltSignal) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(e) => {
                error!("Failed to listen for SIGINT: {}", e);
                std::future::pending::<&'static str>().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                "SIGTERM"
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<&'static str>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    let received = tokio::select! {
        name = ctrl_c => name,
        name = terminate => name,
    };

    info!(signal = received, "Received signal, halting job");
    halt.halt(format!("received {received}"));
}
