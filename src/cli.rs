use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "spindle", about = "High-throughput single-domain web crawler")]
pub struct Cli {
    /// Path to a TOML config file. Missing file falls back to defaults.
    #[arg(short, long)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Crawl a single domain, saturating it with concurrent fetches.
    Crawl {
        /// Domain to crawl (e.g. example.com).
        domain: Option<String>,

        /// Additional seed URL (repeatable).
        #[arg(long = "seed")]
        seeds: Vec<String>,

        /// Path to a file of newline-separated seed URLs.
        #[arg(long)]
        seed_file: Option<String>,

        /// Number of concurrent worker tasks.
        #[arg(short, long)]
        workers: Option<usize>,

        /// Maximum crawl depth (0 = unbounded).
        #[arg(short, long)]
        depth: Option<u32>,

        /// Maximum pages to fetch before stopping (0 = unbounded).
        #[arg(long)]
        max_pages: Option<u64>,

        /// Directory persisted artifacts are written under.
        #[arg(long)]
        data_dir: Option<String>,

        /// Resume a previous crawl of this domain from its saved state.
        #[arg(long)]
        resume: bool,

        /// Keep re-seeding from the sitemap/root once the frontier drains,
        /// instead of stopping.
        #[arg(long)]
        continuous: bool,

        /// Token-bucket rate limit in requests/second (0 = unlimited).
        #[arg(long)]
        rate_limit: Option<u32>,

        /// Disable the live terminal display.
        #[arg(long)]
        no_display: bool,
    },
}
