//! `state.duckdb`: run-level metadata (`status`, `start_time`, ...) plus the
//! `frontier(url, depth)` table that `close()` populates from whatever the
//! frontier had queued at shutdown, so a `resume=true` run can restore it.

use std::sync::Mutex;

use spindle_core::{CrawlError, CrawlItem};

pub struct StateStore {
    conn: Mutex<duckdb::Connection>,
}

impl StateStore {
    pub fn open(path: &std::path::Path) -> Result<Self, CrawlError> {
        let conn = duckdb::Connection::open(path)
            .map_err(|e| CrawlError::Storage(format!("opening state store: {e}")))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS meta (key VARCHAR PRIMARY KEY, value VARCHAR);
             CREATE TABLE IF NOT EXISTS frontier (url VARCHAR, depth UINTEGER);",
        )
        .map_err(|e| CrawlError::Storage(format!("creating state tables: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<(), CrawlError> {
        self.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO meta (key, value) VALUES (?, ?)
                 ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
                duckdb::params![key, value],
            )
            .map_err(|e| CrawlError::Storage(format!("writing meta {key}: {e}")))?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>, CrawlError> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(
            "SELECT value FROM meta WHERE key = ?",
            duckdb::params![key],
            |row| row.get(0),
        ) {
            Ok(value) => Ok(Some(value)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CrawlError::Storage(format!("reading meta {key}: {e}"))),
        }
    }

    /// Replaces the saved frontier with whatever `drain()` returned at
    /// shutdown.
    pub fn save_frontier(&self, items: &[CrawlItem]) -> Result<(), CrawlError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM frontier", [])
            .map_err(|e| CrawlError::Storage(format!("clearing frontier table: {e}")))?;
        let mut stmt = conn
            .prepare("INSERT INTO frontier (url, depth) VALUES (?, ?)")
            .map_err(|e| CrawlError::Storage(format!("preparing frontier insert: {e}")))?;
        for item in items {
            stmt.execute(duckdb::params![item.url, item.depth])
                .map_err(|e| CrawlError::Storage(format!("saving frontier item: {e}")))?;
        }
        Ok(())
    }

    pub fn load_frontier(&self) -> Result<Vec<CrawlItem>, CrawlError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT url, depth FROM frontier")
            .map_err(|e| CrawlError::Storage(format!("loading frontier: {e}")))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CrawlItem {
                    url: row.get(0)?,
                    depth: row.get(1)?,
                })
            })
            .map_err(|e| CrawlError::Storage(format!("loading frontier: {e}")))?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row.map_err(|e| CrawlError::Storage(format!("reading frontier row: {e}")))?);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(&dir.path().join("state.duckdb")).unwrap();
        store.set_meta("status", "running").unwrap();
        assert_eq!(store.get_meta("status").unwrap(), Some("running".to_string()));
        assert_eq!(store.get_meta("missing").unwrap(), None);
    }

    #[test]
    fn frontier_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(&dir.path().join("state.duckdb")).unwrap();
        let items = vec![
            CrawlItem { url: "https://example.com/a".into(), depth: 0 },
            CrawlItem { url: "https://example.com/b".into(), depth: 1 },
        ];
        store.save_frontier(&items).unwrap();
        let loaded = store.load_frontier().unwrap();
        assert_eq!(loaded.len(), 2);
    }
}
