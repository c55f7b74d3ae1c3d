use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{Row, params, params_from_iter};
use serde::{Deserialize, Serialize};
use soyokaze_common::{Error, Result};
use tracing::debug;

use crate::database::Database;
use crate::sql::{date_column, datetime_column, format_date};
use crate::validation::InputValidator;

const ENTRY_COLUMNS: &str = "id, title, content, entry_date, images, created_at, updated_at, \
                             synced, last_modified";

/// A journal entry. `images` holds local image URIs, at most four.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: i64,
    pub title: Option<String>,
    pub content: String,
    pub entry_date: NaiveDate,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub synced: bool,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJournalEntry {
    pub title: Option<String>,
    pub content: String,
    pub entry_date: NaiveDate,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalEntryUpdate {
    pub title: Option<Option<String>>,
    pub content: Option<String>,
    pub entry_date: Option<NaiveDate>,
    pub images: Option<Vec<String>>,
}

impl JournalEntryUpdate {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.entry_date.is_none()
            && self.images.is_none()
    }
}

/// Data access for the `journal_entries` table.
pub struct JournalStore<'db> {
    db: &'db Database,
}

impl<'db> JournalStore<'db> {
    pub(crate) fn new(db: &'db Database) -> Self {
        Self { db }
    }

    pub fn create(&self, entry: NewJournalEntry) -> Result<JournalEntry> {
        InputValidator::require_non_empty("content", &entry.content)?;
        InputValidator::validate_images(&entry.images)?;
        let images = encode_images(&entry.images)?;

        let id = {
            let conn = self.db.connection()?;
            conn.execute(
                "INSERT INTO journal_entries (title, content, images, entry_date, last_modified)
                 VALUES (?1, ?2, ?3, ?4, datetime('now'))",
                params![entry.title, entry.content, images, format_date(entry.entry_date)],
            )
            .map_err(|e| Error::Database(format!("failed to create journal entry: {e}")))?;
            conn.last_insert_rowid()
        };
        debug!("created journal entry {id}");
        self.get(id)
    }

    pub fn get(&self, id: i64) -> Result<JournalEntry> {
        self.query(
            &format!("SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE id = ?1"),
            vec![Value::Integer(id)],
        )?
        .pop()
        .ok_or_else(|| Error::NotFound(format!("journal entry with id {id}")))
    }

    /// All entries, most recent day first.
    pub fn list(&self) -> Result<Vec<JournalEntry>> {
        self.query(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM journal_entries
                 ORDER BY entry_date DESC, created_at DESC, id DESC"
            ),
            Vec::new(),
        )
    }

    pub fn by_date(&self, date: NaiveDate) -> Result<Vec<JournalEntry>> {
        self.query(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM journal_entries
                 WHERE entry_date = ?1
                 ORDER BY created_at DESC, id DESC"
            ),
            vec![Value::Text(format_date(date))],
        )
    }

    /// Entries between `start` and `end`, both inclusive. An inverted range
    /// matches nothing.
    pub fn by_date_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<JournalEntry>> {
        self.query(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM journal_entries
                 WHERE entry_date BETWEEN ?1 AND ?2
                 ORDER BY entry_date DESC, created_at DESC, id DESC"
            ),
            vec![
                Value::Text(format_date(start)),
                Value::Text(format_date(end)),
            ],
        )
    }

    pub fn update(&self, id: i64, update: JournalEntryUpdate) -> Result<JournalEntry> {
        if update.is_empty() {
            return self.get(id);
        }

        let mut assignments = Vec::new();
        let mut values = Vec::new();
        if let Some(title) = update.title {
            assignments.push("title = ?");
            values.push(title.map_or(Value::Null, Value::Text));
        }
        if let Some(content) = update.content {
            InputValidator::require_non_empty("content", &content)?;
            assignments.push("content = ?");
            values.push(Value::Text(content));
        }
        if let Some(date) = update.entry_date {
            assignments.push("entry_date = ?");
            values.push(Value::Text(format_date(date)));
        }
        if let Some(images) = update.images {
            InputValidator::validate_images(&images)?;
            assignments.push("images = ?");
            values.push(encode_images(&images)?.map_or(Value::Null, Value::Text));
        }
        values.push(Value::Integer(id));

        let sql = format!(
            "UPDATE journal_entries
             SET {}, updated_at = datetime('now'), last_modified = datetime('now'), synced = 0
             WHERE id = ?",
            assignments.join(", ")
        );
        let changed = {
            let conn = self.db.connection()?;
            conn.execute(&sql, params_from_iter(values))
                .map_err(|e| Error::Database(format!("failed to update journal entry: {e}")))?
        };
        if changed == 0 {
            return Err(Error::NotFound(format!("journal entry with id {id}")));
        }
        self.get(id)
    }

    pub fn delete(&self, id: i64) -> Result<()> {
        let conn = self.db.connection()?;
        let changed = conn
            .execute("DELETE FROM journal_entries WHERE id = ?1", params![id])
            .map_err(|e| Error::Database(format!("failed to delete journal entry: {e}")))?;
        if changed == 0 {
            return Err(Error::NotFound(format!("journal entry with id {id}")));
        }
        Ok(())
    }

    pub fn needing_sync(&self) -> Result<Vec<JournalEntry>> {
        self.query(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM journal_entries
                 WHERE synced = 0 ORDER BY last_modified ASC, id ASC"
            ),
            Vec::new(),
        )
    }

    pub fn mark_synced(&self, id: i64) -> Result<()> {
        let conn = self.db.connection()?;
        let changed = conn
            .execute(
                "UPDATE journal_entries SET synced = 1 WHERE id = ?1",
                params![id],
            )
            .map_err(|e| Error::Database(format!("failed to mark journal entry synced: {e}")))?;
        if changed == 0 {
            return Err(Error::NotFound(format!("journal entry with id {id}")));
        }
        Ok(())
    }

    fn query(&self, sql: &str, values: Vec<Value>) -> Result<Vec<JournalEntry>> {
        let conn = self.db.connection()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params_from_iter(values), map_entry)
            .map_err(|e| Error::Database(format!("failed to query journal entries: {e}")))?;

        let mut entries = Vec::new();
        for row in rows {
            let (entry, images) = row
                .map_err(|e| Error::Database(format!("failed to read journal entry row: {e}")))?;
            entries.push(JournalEntry {
                images: decode_images(images.as_deref())?,
                ..entry
            });
        }
        Ok(entries)
    }
}

/// Maps everything but `images`, which is returned raw so JSON errors surface
/// as `Error::Serialization`.
fn map_entry(row: &Row<'_>) -> rusqlite::Result<(JournalEntry, Option<String>)> {
    let entry = JournalEntry {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        entry_date: date_column(row, 3)?,
        images: Vec::new(),
        created_at: datetime_column(row, 5)?,
        updated_at: datetime_column(row, 6)?,
        synced: row.get(7)?,
        last_modified: datetime_column(row, 8)?,
    };
    Ok((entry, row.get(4)?))
}

fn encode_images(images: &[String]) -> Result<Option<String>> {
    if images.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(images)?))
}

fn decode_images(raw: Option<&str>) -> Result<Vec<String>> {
    match raw {
        None | Some("") => Ok(Vec::new()),
        Some(json) => Ok(serde_json::from_str(json)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn entry(content: &str, on: NaiveDate) -> NewJournalEntry {
        NewJournalEntry {
            title: None,
            content: content.into(),
            entry_date: on,
            images: Vec::new(),
        }
    }

    #[test]
    fn create_and_get_entry_round_trip() {
        let db = Database::in_memory().unwrap();
        let journal = db.journal();
        let created = journal
            .create(NewJournalEntry {
                title: Some("Morning".into()),
                images: vec!["file:///photos/1.jpg".into(), "file:///photos/2.jpg".into()],
                ..entry("Walked by the river.", date(2024, 4, 1))
            })
            .unwrap();

        let fetched = journal.get(created.id).unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.title.as_deref(), Some("Morning"));
        assert_eq!(fetched.entry_date, date(2024, 4, 1));
        assert_eq!(fetched.images.len(), 2);
        assert!(!fetched.synced);
    }

    #[test]
    fn entry_without_images_stores_null() {
        let db = Database::in_memory().unwrap();
        let created = db
            .journal()
            .create(entry("Quiet day.", date(2024, 4, 2)))
            .unwrap();
        assert!(created.images.is_empty());

        let raw: Option<String> = db
            .connection()
            .unwrap()
            .query_row(
                "SELECT images FROM journal_entries WHERE id = ?1",
                params![created.id],
                |row| row.get(0),
            )
            .unwrap();
        assert!(raw.is_none());
    }

    #[test]
    fn rejects_empty_content_and_too_many_images() {
        let db = Database::in_memory().unwrap();
        let journal = db.journal();
        assert!(matches!(
            journal.create(entry("   ", date(2024, 4, 1))),
            Err(Error::Validation(_))
        ));

        let images = (0..5).map(|i| format!("file:///photos/{i}.jpg")).collect();
        assert!(matches!(
            journal.create(NewJournalEntry {
                images,
                ..entry("Too many photos.", date(2024, 4, 1))
            }),
            Err(Error::Validation(_))
        ));
        assert!(journal.list().unwrap().is_empty());
    }

    #[test]
    fn list_orders_by_day_then_newest() {
        let db = Database::in_memory().unwrap();
        let journal = db.journal();
        let older_day = journal.create(entry("a", date(2024, 3, 30))).unwrap();
        let first = journal.create(entry("b", date(2024, 4, 1))).unwrap();
        let second = journal.create(entry("c", date(2024, 4, 1))).unwrap();

        let ids: Vec<i64> = journal.list().unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![second.id, first.id, older_day.id]);
    }

    #[test]
    fn query_by_date_and_range() {
        let db = Database::in_memory().unwrap();
        let journal = db.journal();
        journal.create(entry("march", date(2024, 3, 31))).unwrap();
        journal.create(entry("april 1", date(2024, 4, 1))).unwrap();
        journal.create(entry("april 3", date(2024, 4, 3))).unwrap();
        journal.create(entry("april 5", date(2024, 4, 5))).unwrap();

        let day = journal.by_date(date(2024, 4, 1)).unwrap();
        assert_eq!(day.len(), 1);
        assert_eq!(day[0].content, "april 1");

        let range: Vec<String> = journal
            .by_date_range(date(2024, 4, 1), date(2024, 4, 3))
            .unwrap()
            .into_iter()
            .map(|e| e.content)
            .collect();
        assert_eq!(range, vec!["april 3", "april 1"]);

        assert!(
            journal
                .by_date_range(date(2024, 4, 3), date(2024, 4, 1))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn update_fields_and_clear_sync() {
        let db = Database::in_memory().unwrap();
        let journal = db.journal();
        let created = journal
            .create(NewJournalEntry {
                title: Some("Draft".into()),
                ..entry("first draft", date(2024, 4, 1))
            })
            .unwrap();
        journal.mark_synced(created.id).unwrap();

        let updated = journal
            .update(
                created.id,
                JournalEntryUpdate {
                    title: Some(None),
                    content: Some("final".into()),
                    images: Some(vec!["file:///photos/x.jpg".into()]),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(updated.title.is_none());
        assert_eq!(updated.content, "final");
        assert_eq!(updated.images, vec!["file:///photos/x.jpg".to_string()]);
        assert_eq!(updated.entry_date, created.entry_date);
        assert!(!updated.synced);

        let moved = journal
            .update(
                created.id,
                JournalEntryUpdate {
                    entry_date: Some(date(2024, 4, 2)),
                    images: Some(Vec::new()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(moved.entry_date, date(2024, 4, 2));
        assert!(moved.images.is_empty());
    }

    #[test]
    fn empty_update_returns_entry_unchanged() {
        let db = Database::in_memory().unwrap();
        let journal = db.journal();
        let created = journal.create(entry("x", date(2024, 4, 1))).unwrap();
        let same = journal
            .update(created.id, JournalEntryUpdate::default())
            .unwrap();
        assert_eq!(same, created);
    }

    #[test]
    fn delete_and_missing_entries() {
        let db = Database::in_memory().unwrap();
        let journal = db.journal();
        let created = journal.create(entry("x", date(2024, 4, 1))).unwrap();

        journal.delete(created.id).unwrap();
        assert!(matches!(journal.get(created.id), Err(Error::NotFound(_))));
        assert!(matches!(journal.delete(created.id), Err(Error::NotFound(_))));
        assert!(matches!(journal.mark_synced(created.id), Err(Error::NotFound(_))));
    }

    #[test]
    fn sync_queue() {
        let db = Database::in_memory().unwrap();
        let journal = db.journal();
        let a = journal.create(entry("a", date(2024, 4, 1))).unwrap();
        let b = journal.create(entry("b", date(2024, 4, 2))).unwrap();

        journal.mark_synced(a.id).unwrap();
        let pending: Vec<i64> = journal.needing_sync().unwrap().iter().map(|e| e.id).collect();
        assert_eq!(pending, vec![b.id]);
    }

    #[test]
    fn malformed_images_column_is_a_serialization_error() {
        let db = Database::in_memory().unwrap();
        let created = db
            .journal()
            .create(entry("x", date(2024, 4, 1)))
            .unwrap();
        db.connection()
            .unwrap()
            .execute(
                "UPDATE journal_entries SET images = 'not json' WHERE id = ?1",
                params![created.id],
            )
            .unwrap();

        assert!(matches!(
            db.journal().get(created.id),
            Err(Error::Serialization(_))
        ));
    }
}
