mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// High worker-task fan-out (default 1000 workers) fragments glibc's
// allocator under sustained load; mimalloc releases memory back promptly.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use spindle_core::config::CrawlerConfig;

use crate::cli::{Cli, Commands};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_stack_size(8 * 1024 * 1024)
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config: CrawlerConfig = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {path}"))?;
            toml::from_str(&raw).with_context(|| format!("parsing config file {path}"))?
        }
        None => CrawlerConfig::default(),
    };

    let Commands::Crawl {
        domain,
        seeds,
        seed_file,
        workers,
        depth,
        max_pages,
        data_dir,
        resume,
        continuous,
        rate_limit,
        no_display,
    } = cli.command;

    if let Some(domain) = domain {
        config.domain = domain;
    }
    if config.domain.is_empty() {
        anyhow::bail!("no domain given: pass `spindle crawl <domain>` or set `domain` in the config file");
    }
    config.seed_urls.extend(seeds);
    if seed_file.is_some() {
        config.seed_file = seed_file;
    }
    if let Some(w) = workers {
        config.workers = w;
    }
    if let Some(d) = depth {
        config.max_depth = d;
    }
    if let Some(m) = max_pages {
        config.max_pages = m;
    }
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    if resume {
        config.resume = true;
    }
    if continuous {
        config.continuous = true;
    }
    if let Some(r) = rate_limit {
        config.rate_limit = r;
    }

    info!(domain = %config.domain, workers = config.workers, "starting crawl");

    let ctx = CancellationToken::new();
    let shutdown_ctx = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("received ctrl-c, draining frontier and persisting state");
            shutdown_ctx.cancel();
        }
    });

    if no_display {
        spindle_crawler::run(ctx, config).await
    } else {
        spindle_crawler::run_with_display(ctx, config).await
    }
}
