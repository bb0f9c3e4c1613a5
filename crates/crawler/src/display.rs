//! 500ms-tick terminal renderer for `run_with_display` (C9 §12).
//!
//! Redraws a fixed-height region in place: cursor up `n` lines (`ESC[nA`)
//! then clear to end of screen (`ESC[J`) before repainting, so the table
//! overwrites itself instead of scrolling.

use std::sync::Arc;
use std::time::Duration;

use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;

use crate::stats::{Stats, StatsSnapshot};

const TICK: Duration = Duration::from_millis(500);
const REGION_HEIGHT: u16 = 7;

pub async fn run(stats: Arc<Stats>, cancel: CancellationToken, domain: String) {
    let mut first = true;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(TICK) => {}
        }
        stats.record_sample();
        if !first {
            print!("\x1b[{REGION_HEIGHT}A\x1b[J");
        }
        first = false;
        render(&domain, &stats.snapshot());
    }
    stats.freeze();
    stats.record_sample();
    if !first {
        print!("\x1b[{REGION_HEIGHT}A\x1b[J");
    }
    render(&domain, &stats.snapshot());
    println!("{}", "crawl finished".green().bold());
}

fn render(domain: &str, snap: &StatsSnapshot) {
    let elapsed = snap.elapsed.as_secs_f64();
    println!("{} {}", "spindle".bold(), domain.cyan());
    println!(
        "  {} {}  {} {}  {} {}",
        "success".green(),
        snap.success,
        "failed".red(),
        snap.failed,
        "timeout".yellow(),
        snap.timeout,
    );
    println!("  {} {:.1} MB   {} {}", "bytes".blue(), snap.bytes as f64 / 1_000_000.0, "links".magenta(), snap.links_found);
    println!("  {} {}   {} {:.1}/s  {} {:.1}/s", "in-flight".bold(), snap.in_flight, "speed".cyan(), snap.current_speed, "peak".cyan(), snap.peak_speed);
    println!("  {} {}   {} {:.0}s", "reseeds".bold(), snap.reseeds, "elapsed".bold(), elapsed);
    let top_status = snap
        .status_hist
        .iter()
        .max_by_key(|(_, count)| **count)
        .map(|(status, count)| format!("{status}:{count}"))
        .unwrap_or_default();
    println!("  {} {}", "top status".dimmed(), top_status);
    println!();
}
