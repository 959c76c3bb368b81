use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gridwrinkl::cli::{self, Cli};

/// Initialize tracing on stderr so stdout carries only command output.
fn init_tracing(debug: bool) {
    let default = if debug {
        "gridwrinkl=debug"
    } else {
        "gridwrinkl=warn"
    };
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default.into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let code = match cli::run(cli, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!("Command failed: {:?}", e);
            eprintln!("error: {}", e);
            ExitCode::from(e.exit_code())
        }
    };

    out.flush()?;
    Ok(code)
}
