use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    pagebook::logging::init().context("init logging")?;

    let cli = pagebook::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        pagebook::cli::Command::Crawl(args) => {
            pagebook::crawl::run(args).await.context("crawl")?;
        }
        pagebook::cli::Command::Bundle(args) => {
            pagebook::book::bundle(args).context("bundle")?;
        }
    }

    Ok(())
}
