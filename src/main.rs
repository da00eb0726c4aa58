use LinkWalker::{config, crawler, report};

use anyhow::Result;
use log2::*;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Indicates start time of a project, lazily initialized
pub static START_TIME: once_cell::sync::Lazy<Instant> = once_cell::sync::Lazy::new(Instant::now);

#[tokio::main]
async fn main() -> Result<()> {
    let _ = *START_TIME;
    let cfg = config::Config::load()?;
    cfg.validate()?;
    let _log2 = stdout()
        .module(true) // include module name
        .module_with_line(true) // include line number from module
        .module_filter(|module| module.starts_with("LinkWalker")) // only this crate
        .compress(false) // compress output
        .level(cfg.log_level.to_string())
        .start();

    let crawler_config = Arc::new(cfg.crawler_config());
    let state = Arc::new(crawler::CrawlerState::new());

    // the timeout counts from process start, not from the first fetch
    let deadline = tokio::time::Instant::from_std(cfg.deadline(*START_TIME)?);

    let termination = crawler::crawl(state, crawler_config, deadline, interrupt()).await?;
    info!("Crawl {}", termination.reason);

    report::write_report(Path::new(report::RESULT_DIR), &cfg.result_prefix, &termination.snapshot)?;

    if !cfg.close_on_finish {
        wait_for_enter().await?;
    }

    Ok(())
}

/// Resolves on Ctrl+C. Never resolves if the handler cannot be installed.
async fn interrupt() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Stopped by Ctrl+C!"),
        Err(e) => {
            warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

async fn wait_for_enter() -> Result<()> {
    use tokio::io::{AsyncBufReadExt, BufReader};

    println!("Press Enter to exit");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(())
}
