// Copyright 2026 Tablehaul Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tablehaul::{Credentials, ExportFormat, Runner, ScrapeConfig, ScrapeError, StrategyKind};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "tablehaul",
    about = "Scrape a paginated product table from a login-protected web app",
    version
)]
struct Cli {
    /// Base URL of the site
    #[arg(long, default_value = "http://localhost:5000")]
    url: String,

    /// Login username
    #[arg(long, default_value = "demo")]
    username: String,

    /// Login password
    #[arg(long, env = "TABLEHAUL_PASSWORD", default_value = "password123", hide_env_values = true)]
    password: String,

    /// Output file
    #[arg(long, short, default_value = "products_scraped.json")]
    output: PathBuf,

    /// Run the browser without a window (rendered strategy)
    #[arg(long)]
    headless: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// How to acquire the listing
    #[arg(long, value_enum, default_value_t = Strategy::Api)]
    strategy: Strategy,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Json)]
    format: Format,

    /// Stop with an error if the listing has more pages than this
    #[arg(long, default_value = "50")]
    max_pages: u32,

    /// Per-request and per-step timeout in milliseconds
    #[arg(long, default_value = "10000")]
    timeout_ms: u64,

    /// Where to save a screenshot when a browser run fails
    #[arg(long, default_value = "error_screenshot.png")]
    screenshot: PathBuf,

    /// On Ctrl-C, write what was collected to <output>.partial.json
    #[arg(long)]
    flush_partial: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    Api,
    Rendered,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Jsonl,
}

impl Cli {
    fn into_config(self) -> ScrapeConfig {
        let mut config = ScrapeConfig::new(
            self.url,
            Credentials::new(self.username, self.password),
            self.output,
        );
        config.strategy = match self.strategy {
            Strategy::Api => StrategyKind::Api,
            Strategy::Rendered => StrategyKind::Rendered,
        };
        config.format = match self.format {
            Format::Json => ExportFormat::Json,
            Format::Jsonl => ExportFormat::Jsonl,
        };
        config.headless = self.headless;
        config.pagination.max_pages = self.max_pages;
        config.timeouts.request_ms = self.timeout_ms;
        config.timeouts.step_ms = self.timeout_ms;
        config.screenshot_path = Some(self.screenshot);
        config.flush_partial = self.flush_partial;
        config
    }
}

fn init_tracing(debug: bool, json: bool) {
    let default = if debug { "tablehaul=debug" } else { "tablehaul=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug, cli.log_json);

    let config = cli.into_config();
    info!(
        "tablehaul v{} ({} strategy) against {}",
        env!("CARGO_PKG_VERSION"),
        config.strategy,
        config.base_url
    );

    let runner = Runner::new(config);
    let cancel = runner.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping after the current page");
            cancel.store(true, Ordering::Relaxed);
        }
    });

    match runner.run().await {
        Ok(summary) => {
            eprintln!(
                "  Scraped {} record(s) from {} page(s) into {}",
                summary.records,
                summary.pages,
                summary.output.display()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("  Error: {e}");
            let code = if matches!(e, ScrapeError::Interrupted { .. }) { 2 } else { 1 };
            std::process::exit(code);
        }
    }
}
