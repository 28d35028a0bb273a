use clap::Parser;
use index_signal::api::KiteClient;
use index_signal::config::AppConfig;
use index_signal::credentials::RedisCredentialSource;
use index_signal::{Advisor, AdvisorError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Suggest CALL/PUT index option positions from a 14-day SMA
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// TOML config file (defaults to ./advisor.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{}", error_line(&e));
            ExitCode::FAILURE
        }
    }
}

/// Single user-facing line for a failed run; transport errors already carry their cause
fn error_line(err: &anyhow::Error) -> String {
    format!("An error occurred: {}", err)
}

fn setup_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("index_signal={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;

    tracing::info!(
        instruments = config.instruments.len(),
        sma_period = config.strategy.sma_period,
        target_profit_percent = config.strategy.target_profit_percent,
        "Starting index signal run"
    );

    let credential_source = RedisCredentialSource::connect(&config.store).await?;
    let broker = KiteClient::new(&config.broker)?;
    let advisor = Advisor::new(config, credential_source, broker);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    advisor.run(&mut out).await?;

    std::io::Write::flush(&mut out).map_err(AdvisorError::Output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_line_names_store_cause_once() {
        let cause = redis::RedisError::from((redis::ErrorKind::IoError, "connection refused"));
        let err = anyhow::Error::from(AdvisorError::Store(cause));

        let line = error_line(&err);
        assert!(line.starts_with("An error occurred: Credential store error: "));
        assert_eq!(line.matches("connection refused").count(), 1);
    }

    #[test]
    fn test_error_line_for_domain_error() {
        let err = anyhow::Error::from(AdvisorError::InstrumentNotFound {
            exchange: "NSE".to_string(),
            symbol: "BANKNIFTY".to_string(),
        });

        assert_eq!(
            error_line(&err),
            "An error occurred: Instrument token for BANKNIFTY not found on NSE"
        );
    }
}
