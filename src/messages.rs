//! SMS inbox sources
//!
//! Reads raw messages from an Android-style `mmssms.db` store or from a JSON export.

use crate::error::{Error, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{debug, warn};

/// A message as stored in the device inbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    #[serde(alias = "_id", deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub body: String,
    /// Epoch milliseconds
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub date_sent: Option<i64>,
}

impl RawMessage {
    pub fn new(id: impl Into<String>, address: Option<&str>, body: &str, date_sent: Option<i64>) -> Self {
        Self {
            id: id.into(),
            address: address.map(str::to_string),
            body: body.to_string(),
            date_sent,
        }
    }
}

/// Which box of the SMS store to read (`type` column)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mailbox {
    Inbox,
    Sent,
}

impl Mailbox {
    pub fn type_code(&self) -> i64 {
        match self {
            Mailbox::Inbox => 1,
            Mailbox::Sent => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListFilter {
    pub mailbox: Mailbox,
    pub max_count: usize,
}

impl ListFilter {
    pub fn inbox(max_count: usize) -> Self {
        Self {
            mailbox: Mailbox::Inbox,
            max_count,
        }
    }
}

/// Device SMS provider
pub trait MessageSource: Send + Sync {
    /// Whether the inbox can be read right now
    fn request_permission(&self) -> bool;

    fn list_messages(&self, filter: &ListFilter) -> Result<Vec<RawMessage>>;
}

/// Reader for an SMS database with the Android `sms` table layout
pub struct SqliteInbox {
    db_path: PathBuf,
}

impl SqliteInbox {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    /// Open database connection (read-only to avoid lock contention)
    fn open_db(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(conn)
    }

    fn has_sms_table(conn: &Connection) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'sms'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl MessageSource for SqliteInbox {
    fn request_permission(&self) -> bool {
        match self.open_db().and_then(|conn| Self::has_sms_table(&conn)) {
            Ok(true) => true,
            Ok(false) => {
                warn!(path = %self.db_path.display(), "SMS store has no sms table");
                false
            }
            Err(e) => {
                warn!(path = %self.db_path.display(), error = %e, "SMS store not readable");
                false
            }
        }
    }

    fn list_messages(&self, filter: &ListFilter) -> Result<Vec<RawMessage>> {
        let conn = self.open_db()?;
        let limit = i64::try_from(filter.max_count).unwrap_or(i64::MAX);

        let mut stmt = conn.prepare(
            r#"
            SELECT _id, address, body, date_sent
            FROM sms
            WHERE type = ?1
            ORDER BY date DESC
            LIMIT ?2
            "#,
        )?;

        let rows = stmt.query_map([filter.mailbox.type_code(), limit], |row| {
            let id: i64 = row.get(0)?;
            Ok(RawMessage {
                id: id.to_string(),
                address: text_column(row.get_ref(1)?),
                body: text_column(row.get_ref(2)?).unwrap_or_default(),
                date_sent: timestamp_column(row.get_ref(3)?),
            })
        })?;

        let messages = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        debug!(count = messages.len(), "Read messages from SMS store");
        Ok(messages)
    }
}

/// A JSON array of raw messages exported from a device
pub struct JsonExport {
    path: PathBuf,
}

impl JsonExport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse an export that is already in memory
    pub fn parse(content: &str) -> Result<Vec<RawMessage>> {
        serde_json::from_str(content)
            .map_err(|e| Error::Parse(format!("raw messages JSON: {}", e)))
    }
}

impl MessageSource for JsonExport {
    fn request_permission(&self) -> bool {
        self.path.is_file()
    }

    /// The mailbox is ignored: an export only holds one box
    fn list_messages(&self, filter: &ListFilter) -> Result<Vec<RawMessage>> {
        let content = std::fs::read_to_string(&self.path)?;
        let mut messages = Self::parse(&content)?;
        messages.truncate(filter.max_count);
        Ok(messages)
    }
}

/// SQLite columns are dynamically typed; non-UTF-8 text and blobs are read lossily
fn text_column(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// Same rules as `lenient_timestamp`, for a store column
fn timestamp_column(value: ValueRef<'_>) -> Option<i64> {
    match value {
        ValueRef::Integer(i) => Some(i),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes).ok()?.trim().parse().ok(),
        _ => None,
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid message id: {}", other))),
    }
}

/// Unusable timestamps become `None` instead of failing the whole batch
fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn create_store(dir: &Path) -> PathBuf {
        let path = dir.join("mmssms.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE sms (
                _id INTEGER PRIMARY KEY,
                address TEXT,
                body TEXT,
                date INTEGER,
                date_sent INTEGER,
                type INTEGER
            );
            INSERT INTO sms VALUES (1, 'HDFCBK', 'Rs.500 debited from a/c', 1000, 990, 1);
            INSERT INTO sms VALUES (2, NULL, 'INR 20 credited', 3000, NULL, 1);
            INSERT INTO sms VALUES (3, '+919800000000', 'see you soon', 2000, 1990, 1);
            INSERT INTO sms VALUES (4, 'ME', 'sent debited note', 4000, 3990, 2);
            "#,
        )
        .unwrap();
        path
    }

    #[test]
    fn test_sqlite_reads_inbox_newest_first() {
        let temp = TempDir::new().unwrap();
        let inbox = SqliteInbox::new(create_store(temp.path()));

        let messages = inbox.list_messages(&ListFilter::inbox(10)).unwrap();
        let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3", "1"]);
        assert_eq!(messages[0].address, None);
        assert_eq!(messages[0].date_sent, None);
        assert_eq!(messages[2].address.as_deref(), Some("HDFCBK"));
        assert_eq!(messages[2].date_sent, Some(990));
    }

    #[test]
    fn test_sqlite_malformed_columns_degrade() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mmssms.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE sms (
                _id INTEGER PRIMARY KEY,
                address TEXT,
                body TEXT,
                date INTEGER,
                date_sent INTEGER,
                type INTEGER
            );
            INSERT INTO sms VALUES (1, 'HDFCBK', 'Rs.500 debited', 1000, 990, 1);
            INSERT INTO sms VALUES (2, 'SBIINB', 'INR 20 credited', 3000, 'garbage', 1);
            INSERT INTO sms VALUES (3, 'AXISBK', X'527320352064656269746564', 2000, ' 1990 ', 1);
            INSERT INTO sms VALUES (4, 42, X'ff20646562697465', 500, 1.5, 1);
            "#,
        )
        .unwrap();
        drop(conn);

        let messages = SqliteInbox::new(path)
            .list_messages(&ListFilter::inbox(10))
            .unwrap();
        let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3", "1", "4"]);

        assert_eq!(messages[0].date_sent, None);
        assert_eq!(messages[0].body, "INR 20 credited");
        // blob body, numeric text timestamp
        assert_eq!(messages[1].body, "Rs 5 debited");
        assert_eq!(messages[1].date_sent, Some(1990));
        assert_eq!(messages[2].date_sent, Some(990));
        // invalid UTF-8 is replaced, a real timestamp is unusable
        assert_eq!(messages[3].body, "\u{FFFD} debite");
        assert_eq!(messages[3].address.as_deref(), Some("42"));
        assert_eq!(messages[3].date_sent, None);
    }

    #[test]
    fn test_sqlite_respects_mailbox_and_limit() {
        let temp = TempDir::new().unwrap();
        let inbox = SqliteInbox::new(create_store(temp.path()));

        let sent = inbox
            .list_messages(&ListFilter {
                mailbox: Mailbox::Sent,
                max_count: 10,
            })
            .unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, "4");

        let limited = inbox.list_messages(&ListFilter::inbox(1)).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, "2");
    }

    #[test]
    fn test_sqlite_permission() {
        let temp = TempDir::new().unwrap();
        let missing = SqliteInbox::new(temp.path().join("missing.db"));
        assert!(!missing.request_permission());
        assert!(missing.list_messages(&ListFilter::inbox(10)).is_err());

        let empty_path = temp.path().join("empty.db");
        Connection::open(&empty_path)
            .unwrap()
            .execute_batch("CREATE TABLE other (x INTEGER);")
            .unwrap();
        assert!(!SqliteInbox::new(empty_path).request_permission());

        let inbox = SqliteInbox::new(create_store(temp.path()));
        assert!(inbox.request_permission());
    }

    #[test]
    fn test_json_parse_lenient_fields() {
        let json = r#"[
            {"_id": 7, "address": "BANK", "body": "Rs 10 debited", "date_sent": "1700000000000"},
            {"id": "x1", "body": "credited", "date_sent": "yesterday"},
            {"id": "x2", "body": "hello"}
        ]"#;
        let messages = JsonExport::parse(json).unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].id, "7");
        assert_eq!(messages[0].date_sent, Some(1_700_000_000_000));
        assert_eq!(messages[1].address, None);
        assert_eq!(messages[1].date_sent, None);
        assert_eq!(messages[2].date_sent, None);
    }

    #[test]
    fn test_json_parse_rejects_garbage() {
        assert!(matches!(JsonExport::parse("{"), Err(Error::Parse(_))));
        assert!(JsonExport::parse(r#"[{"id": true, "body": "x"}]"#).is_err());
    }

    #[test]
    fn test_json_export_source() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("inbox.json");
        let source = JsonExport::new(&path);
        assert!(!source.request_permission());

        std::fs::write(
            &path,
            r#"[{"id":"1","body":"a"},{"id":"2","body":"b"},{"id":"3","body":"c"}]"#,
        )
        .unwrap();
        assert!(source.request_permission());
        let messages = source.list_messages(&ListFilter::inbox(2)).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].id, "2");
    }
}
