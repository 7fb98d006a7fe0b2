//! `sc3` binary entry point.

use clap::Parser;
use ship_commander::cli::{self, Cli};
use ship_commander::infrastructure::logging::{self, LogFormat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    let _guard = logging::init(format, None);
    cli::run(cli).await
}
