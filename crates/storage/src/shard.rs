//! One result-store shard (C3): a DuckDB file holding `pages`/`links`
//! tables, a mutex-guarded in-memory accumulator per table, and a single
//! writer task that drains both accumulators' overflow channels.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{error, info};

use spindle_core::{CrawlError, LinkRecord, PageRecord};

const PAGE_CHUNK: usize = 250;
const LINK_CHUNK: usize = 500;
/// Bounded so a stalled writer applies backpressure to producers instead of
/// growing memory without bound.
const CHANNEL_CAPACITY: usize = 8;

struct Accumulator {
    pages: Mutex<Vec<PageRecord>>,
    links: Mutex<Vec<LinkRecord>>,
}

/// Handle a worker holds to push records into one shard. Cheap to clone;
/// actual I/O happens on the shard's writer task.
#[derive(Clone)]
pub struct ShardHandle {
    page_threshold: usize,
    link_threshold: usize,
    acc: std::sync::Arc<Accumulator>,
    page_tx: mpsc::Sender<Vec<PageRecord>>,
    link_tx: mpsc::Sender<Vec<LinkRecord>>,
}

impl ShardHandle {
    /// Pushes `record` into the accumulator; if the page batch just crossed
    /// `batch_size`, hands the full batch off to the writer channel
    /// (blocking this caller only if the channel itself is full).
    pub async fn add_page(&self, record: PageRecord) -> Result<(), CrawlError> {
        let full = {
            let mut pages = self.acc.pages.lock().unwrap();
            pages.push(record);
            if pages.len() >= self.page_threshold {
                Some(std::mem::take(&mut *pages))
            } else {
                None
            }
        };
        if let Some(batch) = full {
            self.page_tx
                .send(batch)
                .await
                .map_err(|_| CrawlError::Storage("page writer channel closed".into()))?;
        }
        Ok(())
    }

    pub async fn add_links(&self, records: Vec<LinkRecord>) -> Result<(), CrawlError> {
        let full = {
            let mut links = self.acc.links.lock().unwrap();
            links.extend(records);
            if links.len() >= self.link_threshold {
                Some(std::mem::take(&mut *links))
            } else {
                None
            }
        };
        if let Some(batch) = full {
            self.link_tx
                .send(batch)
                .await
                .map_err(|_| CrawlError::Storage("link writer channel closed".into()))?;
        }
        Ok(())
    }

    /// Pushes whatever is left in the accumulator, then drops this
    /// handle's senders. Called once per shard during `close()`; callers
    /// must drop every other clone of the handle first so the writer
    /// actually observes channel closure.
    async fn flush_remainder(&self) -> Result<(), CrawlError> {
        let pages = std::mem::take(&mut *self.acc.pages.lock().unwrap());
        if !pages.is_empty() {
            self.page_tx
                .send(pages)
                .await
                .map_err(|_| CrawlError::Storage("page writer channel closed".into()))?;
        }
        let links = std::mem::take(&mut *self.acc.links.lock().unwrap());
        if !links.is_empty() {
            self.link_tx
                .send(links)
                .await
                .map_err(|_| CrawlError::Storage("link writer channel closed".into()))?;
        }
        Ok(())
    }
}

pub struct Shard {
    pub handle: ShardHandle,
    writer: tokio::task::JoinHandle<()>,
    page_tx: mpsc::Sender<Vec<PageRecord>>,
    link_tx: mpsc::Sender<Vec<LinkRecord>>,
    conn: Arc<Mutex<duckdb::Connection>>,
    path: std::path::PathBuf,
}

impl Shard {
    pub fn open(
        path: std::path::PathBuf,
        shard_index: u32,
        batch_size: usize,
        flushed_count: Arc<AtomicU64>,
    ) -> Result<Self, CrawlError> {
        let conn = duckdb::Connection::open(&path)
            .map_err(|e| CrawlError::Storage(format!("opening shard {shard_index}: {e}")))?;
        create_tables(&conn, shard_index)
            .map_err(|e| CrawlError::Storage(format!("creating shard {shard_index} tables: {e}")))?;
        let conn = Arc::new(Mutex::new(conn));

        let (page_tx, page_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (link_tx, link_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let acc = Arc::new(Accumulator {
            pages: Mutex::new(Vec::with_capacity(batch_size)),
            links: Mutex::new(Vec::with_capacity(batch_size * 5)),
        });

        let writer_conn = conn.clone();
        let writer = tokio::task::spawn_blocking(move || {
            writer_loop(writer_conn, shard_index, page_rx, link_rx, flushed_count)
        });

        let handle = ShardHandle {
            page_threshold: batch_size,
            link_threshold: batch_size * 5,
            acc,
            page_tx: page_tx.clone(),
            link_tx: link_tx.clone(),
        };

        Ok(Self {
            handle,
            writer,
            page_tx,
            link_tx,
            conn,
            path,
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Every page URL ever written to this shard. Runs on the blocking
    /// pool, sharing the shard's single connection with the writer task.
    pub async fn scan_pages(&self) -> Result<Vec<String>, CrawlError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn
                .prepare("SELECT url FROM pages")
                .map_err(|e| CrawlError::Storage(format!("scanning pages: {e}")))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| CrawlError::Storage(format!("scanning pages: {e}")))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| CrawlError::Storage(format!("reading page row: {e}")))
        })
        .await
        .map_err(|e| CrawlError::Storage(format!("scan task panicked: {e}")))?
    }

    /// Internal link targets in this shard with no matching `pages.url` row.
    pub async fn scan_pending_links(&self) -> Result<Vec<String>, CrawlError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn
                .prepare(
                    "SELECT DISTINCT l.target_url FROM links l
                     WHERE l.is_internal
                       AND NOT EXISTS (SELECT 1 FROM pages p WHERE p.url = l.target_url)",
                )
                .map_err(|e| CrawlError::Storage(format!("scanning pending links: {e}")))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| CrawlError::Storage(format!("scanning pending links: {e}")))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| CrawlError::Storage(format!("reading link row: {e}")))
        })
        .await
        .map_err(|e| CrawlError::Storage(format!("scan task panicked: {e}")))?
    }

    /// Flushes the partial batches, closes the channels, and waits for the
    /// writer to drain and exit. Order matters: flush-then-close-then-join,
    /// or the writer may exit before seeing the final partial batch.
    pub async fn close(self) -> Result<(), CrawlError> {
        self.handle.flush_remainder().await?;
        drop(self.page_tx);
        drop(self.link_tx);
        drop(self.handle);
        self.writer
            .await
            .map_err(|e| CrawlError::Storage(format!("writer task panicked: {e}")))
    }
}

fn create_tables(conn: &duckdb::Connection, shard_index: u32) -> duckdb::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS pages (
            url VARCHAR PRIMARY KEY,
            url_hash UBIGINT,
            depth UINTEGER,
            status_code USMALLINT,
            content_type VARCHAR,
            content_length UBIGINT,
            body_hash UBIGINT,
            body BLOB,
            title VARCHAR,
            description VARCHAR,
            language VARCHAR,
            canonical VARCHAR,
            etag VARCHAR,
            last_modified VARCHAR,
            server VARCHAR,
            redirect_url VARCHAR,
            link_count UINTEGER,
            fetch_time_ms UBIGINT,
            crawled_at TIMESTAMP,
            error VARCHAR
        );
        CREATE TABLE IF NOT EXISTS links (
            source_hash UBIGINT,
            target_url VARCHAR,
            anchor_text VARCHAR,
            rel VARCHAR,
            is_internal BOOLEAN
        );",
    )?;
    if shard_index == 0 {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS meta (key VARCHAR PRIMARY KEY, value VARCHAR);",
        )?;
    }
    Ok(())
}

fn writer_loop(
    conn: Arc<Mutex<duckdb::Connection>>,
    shard_index: u32,
    mut page_rx: mpsc::Receiver<Vec<PageRecord>>,
    mut link_rx: mpsc::Receiver<Vec<LinkRecord>>,
    flushed_count: Arc<AtomicU64>,
) {
    let rt = tokio::runtime::Handle::current();
    let mut pages_done = false;
    let mut links_done = false;
    while !pages_done || !links_done {
        let next = rt.block_on(async {
            tokio::select! {
                page_batch = page_rx.recv(), if !pages_done => Next::Pages(page_batch),
                link_batch = link_rx.recv(), if !links_done => Next::Links(link_batch),
            }
        });
        match next {
            Next::Pages(Some(batch)) => {
                let conn = conn.lock().unwrap();
                for chunk in batch.chunks(PAGE_CHUNK) {
                    if let Err(e) = insert_pages(&conn, chunk) {
                        error!(shard = shard_index, error = %e, "page insert failed");
                        continue;
                    }
                    flushed_count.fetch_add(chunk.len() as u64, Ordering::Relaxed);
                }
            }
            Next::Links(Some(batch)) => {
                let conn = conn.lock().unwrap();
                for chunk in batch.chunks(LINK_CHUNK) {
                    if let Err(e) = insert_links(&conn, chunk) {
                        error!(shard = shard_index, error = %e, "link insert failed");
                    }
                }
            }
            // A sender dropping only means its own channel is exhausted; the
            // other may still be holding a final batch, so the guards above
            // keep it the only one polled until it too reports done.
            Next::Pages(None) => pages_done = true,
            Next::Links(None) => links_done = true,
        }
    }
    info!(shard = shard_index, "writer drained, shutting down");
}

enum Next {
    Pages(Option<Vec<PageRecord>>),
    Links(Option<Vec<LinkRecord>>),
}

fn insert_pages(conn: &duckdb::Connection, chunk: &[PageRecord]) -> duckdb::Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO pages (url, url_hash, depth, status_code, content_type, content_length,
            body_hash, body, title, description, language, canonical, etag, last_modified,
            server, redirect_url, link_count, fetch_time_ms, crawled_at, error)
         VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)
         ON CONFLICT (url) DO UPDATE SET
            status_code = EXCLUDED.status_code,
            content_type = EXCLUDED.content_type,
            crawled_at = EXCLUDED.crawled_at,
            error = EXCLUDED.error",
    )?;
    for r in chunk {
        stmt.execute(duckdb::params![
            r.url,
            r.url_hash,
            r.depth,
            r.status_code,
            r.content_type,
            r.content_length,
            r.body_hash,
            r.body_compressed,
            r.title,
            r.description,
            r.language,
            r.canonical,
            r.etag,
            r.last_modified,
            r.server,
            r.redirect_url,
            r.link_count,
            r.fetch_time_ms,
            r.crawled_at.naive_utc(),
            r.error,
        ])?;
    }
    Ok(())
}

fn insert_links(conn: &duckdb::Connection, chunk: &[LinkRecord]) -> duckdb::Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO links (source_hash, target_url, anchor_text, rel, is_internal)
         VALUES (?,?,?,?,?)",
    )?;
    for r in chunk {
        stmt.execute(duckdb::params![
            r.source_hash,
            r.target_url,
            r.anchor_text,
            r.rel,
            r.is_internal,
        ])?;
    }
    Ok(())
}
