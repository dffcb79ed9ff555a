//! SQLite-backed store for every Frontline resource.
//!
//! One connection behind a mutex. Resource-specific queries live in sibling
//! modules as further `impl SqliteStore` blocks; this file owns opening,
//! schema setup, shared helpers and statistics.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::Connection;
use tracing::info;

use crate::schema::{FTS_SCHEMA_SQL, FTS_TRIGGERS_SQL, SCHEMA_SQL};
use crate::types::{Page, StoreStats};
use frontline_core::{Error, Result};

pub const DB_FILE_NAME: &str = "frontline.db";

/// SQLite store with FTS5 listing search.
pub struct SqliteStore {
    pub(crate) conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open or create the SQLite store.
    ///
    /// `db_dir` is the directory (e.g., `data/db/`). The file will be `db_dir/frontline.db`.
    pub fn open(db_dir: impl AsRef<Path>) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        let db_path = db_dir.join(DB_FILE_NAME);

        let conn = Connection::open(&db_path).map_err(db_err)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(db_err)?;

        let store = Self::from_connection(conn, db_path)?;
        let stats = store.get_stats()?;
        info!(
            "SqliteStore initialized: {} users, {} posts, {} communities, {} courses, path={}",
            stats.users,
            stats.posts,
            stats.communities,
            stats.courses,
            store.db_path.display()
        );
        Ok(store)
    }

    /// Open a throwaway in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::from_connection(conn, PathBuf::from(":memory:"))
    }

    fn from_connection(conn: Connection, db_path: PathBuf) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_err)?;
        let full_schema = format!("{}\n{}\n{}", SCHEMA_SQL, FTS_SCHEMA_SQL, FTS_TRIGGERS_SQL);
        conn.execute_batch(&full_schema)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ---------------------------------------------------------------
    // Stats
    // ---------------------------------------------------------------

    /// Get store statistics.
    pub fn get_stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock();
        let count = |sql: &str| -> Result<i64> {
            conn.query_row(sql, [], |row| row.get(0)).map_err(db_err)
        };

        let stats = StoreStats {
            users: count("SELECT COUNT(*) FROM users")?,
            sellers: count("SELECT COUNT(*) FROM users WHERE role = 'seller'")?,
            posts: count("SELECT COUNT(*) FROM posts")?,
            courses: count("SELECT COUNT(*) FROM courses")?,
            communities: count("SELECT COUNT(*) FROM communities")?,
            connections: count("SELECT COUNT(*) FROM connections")?,
            ratings: count("SELECT COUNT(*) FROM ratings")?,
            active_sessions: conn
                .query_row(
                    "SELECT COUNT(*) FROM sessions WHERE expires_at > ?1",
                    [now_ms()],
                    |row| row.get(0),
                )
                .map_err(db_err)?,
            db_path: self.db_path.to_string_lossy().to_string(),
            db_size_mb: 0.0,
        };
        drop(conn);

        let db_size = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(StoreStats {
            db_size_mb: db_size as f64 / (1024.0 * 1024.0),
            ..stats
        })
    }
}

// ---------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------

pub(crate) fn db_err(e: rusqlite::Error) -> Error {
    Error::Database(e.to_string())
}

/// Map a UNIQUE violation to `Conflict`, anything else to `Database`.
pub(crate) fn unique_err(what: &str) -> impl FnOnce(rusqlite::Error) -> Error + '_ {
    move |e| {
        if e.to_string().contains("UNIQUE constraint") {
            Error::Conflict(what.to_string())
        } else {
            Error::Database(e.to_string())
        }
    }
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Trim and drop blank optional text.
pub(crate) fn clean(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

/// Escape a user-supplied substring for `LIKE ... ESCAPE '\'`.
pub(crate) fn like_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for c in needle.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

/// Dynamic `WHERE` clause with positional parameters.
#[derive(Default)]
pub(crate) struct Filter {
    clauses: Vec<String>,
    values: Vec<Value>,
}

impl Filter {
    pub(crate) fn push(&mut self, clause: &str, value: impl Into<Value>) {
        self.clauses.push(clause.to_string());
        self.values.push(value.into());
    }

    /// Add a clause whose placeholders all bind the same value.
    pub(crate) fn push_repeated(&mut self, clause: &str, value: Value) {
        for _ in 0..clause.matches('?').count() {
            self.values.push(value.clone());
        }
        self.clauses.push(clause.to_string());
    }

    pub(crate) fn sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub(crate) fn params(&self) -> &[Value] {
        &self.values
    }

    /// Parameters followed by `LIMIT ? OFFSET ?` values.
    pub(crate) fn paged_params(&self, page: Page) -> Vec<Value> {
        let mut values = self.values.clone();
        values.push(Value::Integer(i64::try_from(page.page_size).unwrap_or(i64::MAX)));
        values.push(Value::Integer(i64::try_from(page.offset()).unwrap_or(i64::MAX)));
        values
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{NewUser, Role};
    use tempfile::TempDir;

    pub(crate) fn test_store() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path()).unwrap();
        (store, dir)
    }

    pub(crate) fn add_user(store: &SqliteStore, name: &str, role: Role) -> i64 {
        store
            .create_user(NewUser {
                name: name.to_string(),
                email: format!("{}@example.com", name.to_lowercase()),
                password_hash: "hash".into(),
                phone: Some("233241234567".into()),
                role,
            })
            .unwrap()
            .id
    }

    #[test]
    fn test_open_creates_db_file() {
        let (store, dir) = test_store();
        assert!(dir.path().join(DB_FILE_NAME).exists());
        assert_eq!(store.db_path(), dir.path().join(DB_FILE_NAME));
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = TempDir::new().unwrap();
        {
            let store = SqliteStore::open(dir.path()).unwrap();
            add_user(&store, "Kofi", Role::Seller);
        }
        let store = SqliteStore::open(dir.path()).unwrap();
        assert_eq!(store.get_stats().unwrap().users, 1);
    }

    #[test]
    fn test_stats_counts() {
        let (store, _dir) = test_store();
        add_user(&store, "Ama", Role::Seller);
        add_user(&store, "Yaw", Role::Buyer);

        let stats = store.get_stats().unwrap();
        assert_eq!(stats.users, 2);
        assert_eq!(stats.sellers, 1);
        assert_eq!(stats.posts, 0);
        assert!(stats.db_path.ends_with(DB_FILE_NAME));
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_filter_sql() {
        let mut f = Filter::default();
        assert_eq!(f.sql(), "");
        f.push("a = ?", 1i64);
        f.push_repeated("(b LIKE ? OR c LIKE ?)", Value::Text("x".into()));
        assert_eq!(f.sql(), " WHERE a = ? AND (b LIKE ? OR c LIKE ?)");
        assert_eq!(f.params().len(), 3);
        assert_eq!(f.paged_params(Page::default()).len(), 5);
    }

    #[test]
    fn test_last_page_lists_nothing() {
        let (store, _dir) = test_store();
        add_user(&store, "Ama", Role::Seller);
        let page = store
            .list_users(&crate::types::UserFilter {
                page: Page::new(Some(usize::MAX), Some(100)),
                ..Default::default()
            })
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 1);
    }
}
