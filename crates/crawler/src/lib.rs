//! Orchestration: wires C1-C9 together behind the two entry points named
//! in spec §6, `run` and `run_with_display`.

pub mod coordinator;
pub mod display;
pub mod stats;
pub mod worker;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use spindle_core::CrawlerConfig;
use spindle_discovery::{fetch_robots, RobotsRules};
use spindle_frontier::{Frontier, FrontierConfig, RobotsCheck};
use spindle_networks::TransportPool;
use spindle_storage::{open_state, ResultStore};

use coordinator::Coordinator;
use stats::Stats;
use worker::Worker;

/// Blocks until the coordinator signals completion or `ctx` cancels.
pub async fn run(ctx: CancellationToken, config: CrawlerConfig) -> Result<()> {
    run_inner(ctx, config, None).await
}

/// Identical to `run`, but spawns a 500ms-tick terminal renderer that
/// redraws its region in place until the crawl finishes.
pub async fn run_with_display(ctx: CancellationToken, config: CrawlerConfig) -> Result<()> {
    let stats = Arc::new(Stats::new());
    let display_cancel = ctx.child_token();
    let display_handle = tokio::spawn(display::run(stats.clone(), display_cancel.clone(), config.domain.clone()));

    let result = run_inner(ctx, config, Some(stats)).await;
    display_cancel.cancel();
    let _ = display_handle.await;
    result
}

async fn run_inner(ctx: CancellationToken, config: CrawlerConfig, stats: Option<Arc<Stats>>) -> Result<()> {
    let config = Arc::new(config);
    let stats = stats.unwrap_or_else(|| Arc::new(Stats::new()));

    std::fs::create_dir_all(config.domain_dir())
        .with_context(|| format!("creating domain directory {}", config.domain_dir().display()))?;

    let store = Arc::new(ResultStore::open(&config).context("opening result store")?);
    let state = open_state(&config.domain_dir()).context("opening state store")?;
    let transport = Arc::new(TransportPool::new(&config).context("building transport pool")?);

    let robots: Arc<RobotsRules> = if config.respect_robots {
        Arc::new(fetch_robots(transport.shard(0), &format!("https://{}", config.domain), &config.user_agent).await)
    } else {
        Arc::new(RobotsRules::allow_all())
    };
    let robots_check: Arc<dyn RobotsCheck> = robots.clone();

    let frontier = Arc::new(Frontier::new(
        FrontierConfig {
            capacity: config.frontier_size,
            bloom_capacity: config.bloom_capacity,
            bloom_fpr: config.bloom_fpr,
            domain: config.domain.clone(),
            include_subdomain: config.include_subdomain,
        },
        robots_check,
    ));

    // Resume sequencing: (1) shards already open above, (2) replay what's
    // already on disk, (3) restore the saved frontier, (4) seed normally.
    // The store's scan callbacks are synchronous, so collect first and
    // await the frontier calls afterward rather than blocking inside them.
    if config.resume {
        let mut existing = Vec::new();
        store
            .load_existing_urls(|url| existing.push(url.to_string()))
            .await
            .context("loading existing urls for resume")?;
        for url in &existing {
            frontier.mark_seen(url).await;
        }
        info!(count = existing.len(), "resume: marked existing urls seen");

        let mut pending = Vec::new();
        store
            .load_pending_links(|url, _depth| {
                pending.push(url.to_string());
                true
            })
            .await
            .context("loading pending links for resume")?;
        for url in &pending {
            frontier.try_add(url, 0).await;
        }
        info!(reoffered = pending.len(), "resume: re-offered pending internal links");

        for item in state.load_frontier().context("loading saved frontier")? {
            frontier.push_direct(item).await;
        }
    }

    seed(&config, &frontier, &robots, &transport).await;

    state.set_meta("status", "running").ok();
    state.set_meta("start_time", &chrono::Utc::now().to_rfc3339()).ok();

    let limiter = worker::build_rate_limiter(config.rate_limit);

    let mut worker_handles = Vec::with_capacity(config.workers);
    for id in 0..config.workers {
        let worker = Worker {
            id,
            frontier: frontier.clone(),
            transport: transport.clone(),
            store: store.clone(),
            stats: stats.clone(),
            config: config.clone(),
            limiter: limiter.clone(),
        };
        worker_handles.push(tokio::spawn(worker.run(ctx.clone())));
    }

    let coordinator = Coordinator {
        frontier: frontier.clone(),
        transport: transport.clone(),
        stats: stats.clone(),
        config: config.clone(),
        robots: robots.clone(),
        cancel: ctx.clone(),
    };
    let coordinator_handle = tokio::spawn(coordinator.run());

    ctx.cancelled().await;
    for handle in worker_handles {
        let _ = handle.await;
    }
    let _ = coordinator_handle.await;

    stats.freeze();
    let drained = frontier.drain().await;
    state.save_frontier(&drained).context("persisting drained frontier")?;
    state.set_meta("status", "stopped").ok();
    state.set_meta("end_time", &chrono::Utc::now().to_rfc3339()).ok();
    state.set_meta("pages_crawled", &stats.snapshot().success.to_string()).ok();

    // Every worker holding a clone of `store` has been awaited above, so
    // this is the only strong reference left.
    match Arc::try_unwrap(store) {
        Ok(store) => store.close().await.context("closing result store")?,
        Err(_) => anyhow::bail!("result store has unexpected outstanding references at shutdown"),
    }

    Ok(())
}

async fn seed(config: &CrawlerConfig, frontier: &Frontier, robots: &RobotsRules, transport: &TransportPool) {
    let mut seeds: Vec<String> = config.seed_urls.clone();
    if let Some(path) = &config.seed_file {
        if let Ok(content) = std::fs::read_to_string(path) {
            seeds.extend(content.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string));
        }
    }
    if seeds.is_empty() {
        seeds.push(format!("https://{}/", config.domain));
    }
    for url in &seeds {
        frontier.try_add(url, 0).await;
    }

    if config.follow_sitemap {
        let sitemap_urls = spindle_discovery::discover_sitemap_urls(
            transport.shard(0),
            &format!("https://{}", config.domain),
            robots.sitemaps(),
            10_000,
        )
        .await;
        for url in sitemap_urls {
            frontier.try_add(&url, 0).await;
        }
    }
}
