//! Atomic counters + rolling-window throughput (C9).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How far back the rolling-throughput window looks.
const WINDOW: Duration = Duration::from_secs(10);

pub struct Stats {
    start: Instant,
    success: AtomicU64,
    failed: AtomicU64,
    timeout: AtomicU64,
    bytes: AtomicU64,
    fetch_ms_total: AtomicU64,
    in_flight: AtomicI64,
    links_found: AtomicU64,
    reseeds: AtomicU64,

    status_hist: Mutex<HashMap<u16, u64>>,
    depth_hist: Mutex<HashMap<u32, u64>>,

    /// `(observed_at, fetched_total, bytes_total)`, oldest first.
    window: Mutex<VecDeque<(Instant, u64, u64)>>,
    /// Bit pattern of an f64; peak pages/sec ever observed in `record_sample`.
    peak_speed_bits: AtomicU64,

    /// Set by `freeze()`; once set, `snapshot().elapsed` stops advancing.
    frozen_elapsed: Mutex<Option<Duration>>,
}

#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub elapsed: Duration,
    pub success: u64,
    pub failed: u64,
    pub timeout: u64,
    pub bytes: u64,
    pub fetch_ms_total: u64,
    pub in_flight: i64,
    pub links_found: u64,
    pub reseeds: u64,
    pub status_hist: HashMap<u16, u64>,
    pub depth_hist: HashMap<u32, u64>,
    pub current_speed: f64,
    pub peak_speed: f64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            success: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            timeout: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            fetch_ms_total: AtomicU64::new(0),
            in_flight: AtomicI64::new(0),
            links_found: AtomicU64::new(0),
            reseeds: AtomicU64::new(0),
            status_hist: Mutex::new(HashMap::new()),
            depth_hist: Mutex::new(HashMap::new()),
            window: Mutex::new(VecDeque::new()),
            peak_speed_bits: AtomicU64::new(0),
            frozen_elapsed: Mutex::new(None),
        }
    }

    pub fn inc_in_flight(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_in_flight(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn in_flight(&self) -> i64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn record_success(&self, bytes: u64, fetch_ms: u64, status: u16, depth: u32, links: u32) {
        self.success.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.fetch_ms_total.fetch_add(fetch_ms, Ordering::Relaxed);
        self.links_found.fetch_add(links as u64, Ordering::Relaxed);
        *self.status_hist.lock().unwrap().entry(status).or_insert(0) += 1;
        *self.depth_hist.lock().unwrap().entry(depth).or_insert(0) += 1;
    }

    pub fn record_failed(&self, fetch_ms: u64, status: u16) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.fetch_ms_total.fetch_add(fetch_ms, Ordering::Relaxed);
        *self.status_hist.lock().unwrap().entry(status).or_insert(0) += 1;
    }

    pub fn record_timeout(&self, fetch_ms: u64) {
        self.timeout.fetch_add(1, Ordering::Relaxed);
        self.fetch_ms_total.fetch_add(fetch_ms, Ordering::Relaxed);
        *self.status_hist.lock().unwrap().entry(0).or_insert(0) += 1;
    }

    pub fn record_reseed(&self) {
        self.reseeds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn success_count(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    /// Appends a `(now, fetched_total, bytes_total)` sample, drops samples
    /// older than `WINDOW`, and updates the peak-speed high-water mark.
    /// Called once per display tick — the window's definition is what makes
    /// "current speed" meaningful even once the frontier has drained and
    /// refilled several times in continuous mode.
    pub fn record_sample(&self) {
        let now = Instant::now();
        let fetched = self.success.load(Ordering::Relaxed) + self.failed.load(Ordering::Relaxed);
        let bytes = self.bytes.load(Ordering::Relaxed);

        let mut window = self.window.lock().unwrap();
        window.push_back((now, fetched, bytes));
        while let Some(&(t, _, _)) = window.front() {
            if now.duration_since(t) > WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }

        if let (Some(&(t0, f0, _)), Some(&(t1, f1, _))) = (window.front(), window.back()) {
            let dt = t1.duration_since(t0).as_secs_f64();
            let speed = if dt > 0.0 { (f1 - f0) as f64 / dt } else { 0.0 };
            let peak = f64::from_bits(self.peak_speed_bits.load(Ordering::Relaxed));
            if speed > peak {
                self.peak_speed_bits.store(speed.to_bits(), Ordering::Relaxed);
            }
        }
    }

    /// Snapshots elapsed time once so the final display shows the actual
    /// run duration regardless of how long rendering the summary takes.
    pub fn freeze(&self) {
        let mut frozen = self.frozen_elapsed.lock().unwrap();
        if frozen.is_none() {
            *frozen = Some(self.start.elapsed());
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let elapsed = self.frozen_elapsed.lock().unwrap().unwrap_or_else(|| self.start.elapsed());
        let window = self.window.lock().unwrap();
        let current_speed = match (window.front(), window.back()) {
            (Some(&(t0, f0, _)), Some(&(t1, f1, _))) if t1 > t0 => {
                (f1 - f0) as f64 / t1.duration_since(t0).as_secs_f64()
            }
            _ => 0.0,
        };
        drop(window);

        StatsSnapshot {
            elapsed,
            success: self.success.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timeout: self.timeout.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            fetch_ms_total: self.fetch_ms_total.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            links_found: self.links_found.load(Ordering::Relaxed),
            reseeds: self.reseeds.load(Ordering::Relaxed),
            status_hist: self.status_hist.lock().unwrap().clone(),
            depth_hist: self.depth_hist.lock().unwrap().clone(),
            current_speed,
            peak_speed: f64::from_bits(self.peak_speed_bits.load(Ordering::Relaxed)),
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_tracks_balanced_inc_dec() {
        let s = Stats::new();
        s.inc_in_flight();
        s.inc_in_flight();
        s.dec_in_flight();
        assert_eq!(s.in_flight(), 1);
    }

    #[test]
    fn record_success_updates_histograms() {
        let s = Stats::new();
        s.record_success(100, 5, 200, 1, 3);
        s.record_success(50, 2, 200, 1, 1);
        let snap = s.snapshot();
        assert_eq!(snap.success, 2);
        assert_eq!(snap.bytes, 150);
        assert_eq!(snap.links_found, 4);
        assert_eq!(snap.status_hist.get(&200), Some(&2));
        assert_eq!(snap.depth_hist.get(&1), Some(&2));
    }

    #[test]
    fn freeze_pins_elapsed() {
        let s = Stats::new();
        s.freeze();
        let first = s.snapshot().elapsed;
        std::thread::sleep(Duration::from_millis(20));
        let second = s.snapshot().elapsed;
        assert_eq!(first, second);
    }

    #[test]
    fn record_sample_tracks_peak_speed() {
        let s = Stats::new();
        for _ in 0..5 {
            s.record_success(10, 1, 200, 0, 0);
        }
        s.record_sample();
        let snap = s.snapshot();
        assert!(snap.peak_speed >= 0.0);
    }
}
