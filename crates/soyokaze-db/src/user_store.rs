use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Row, params, params_from_iter};
use serde::{Deserialize, Serialize};
use soyokaze_common::{Error, Result};
use tracing::debug;

use crate::database::Database;
use crate::sql::{datetime_column, is_constraint_violation};
use crate::validation::InputValidator;

const USER_COLUMNS: &str =
    "id, name, email, avatar_url, created_at, updated_at, synced, last_modified";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub synced: bool,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub avatar_url: Option<String>,
}

/// Partial update. `None` leaves a field untouched; `avatar_url: Some(None)`
/// clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<Option<String>>,
}

impl UserUpdate {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.avatar_url.is_none()
    }
}

/// Data access for the `users` table.
pub struct UserStore<'db> {
    db: &'db Database,
}

impl<'db> UserStore<'db> {
    pub(crate) fn new(db: &'db Database) -> Self {
        Self { db }
    }

    pub fn create(&self, user: NewUser) -> Result<User> {
        InputValidator::require_non_empty("name", &user.name)?;
        InputValidator::validate_email(&user.email)?;
        if let Some(url) = &user.avatar_url {
            InputValidator::validate_url(url)?;
        }

        let id = {
            let conn = self.db.connection()?;
            conn.execute(
                "INSERT INTO users (name, email, avatar_url, last_modified)
                 VALUES (?1, ?2, ?3, datetime('now'))",
                params![user.name, user.email, user.avatar_url],
            )
            .map_err(|e| write_error(e, &user.email, "create user"))?;
            conn.last_insert_rowid()
        };
        debug!("created user {id}");
        self.get(id)
    }

    pub fn get(&self, id: i64) -> Result<User> {
        self.query(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            vec![Value::Integer(id)],
        )?
        .pop()
        .ok_or_else(|| Error::NotFound(format!("user with id {id}")))
    }

    pub fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let mut users = self.query(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            vec![Value::Text(email.to_string())],
        )?;
        Ok(users.pop())
    }

    /// All users, newest first.
    pub fn list(&self) -> Result<Vec<User>> {
        self.query(
            &format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC"),
            Vec::new(),
        )
    }

    pub fn update(&self, id: i64, update: UserUpdate) -> Result<User> {
        if update.is_empty() {
            return self.get(id);
        }

        let mut assignments = Vec::new();
        let mut values = Vec::new();
        if let Some(name) = update.name {
            InputValidator::require_non_empty("name", &name)?;
            assignments.push("name = ?");
            values.push(Value::Text(name));
        }
        let email = update.email;
        if let Some(email) = &email {
            InputValidator::validate_email(email)?;
            assignments.push("email = ?");
            values.push(Value::Text(email.clone()));
        }
        if let Some(avatar_url) = update.avatar_url {
            if let Some(url) = &avatar_url {
                InputValidator::validate_url(url)?;
            }
            assignments.push("avatar_url = ?");
            values.push(avatar_url.map_or(Value::Null, Value::Text));
        }
        values.push(Value::Integer(id));

        let sql = format!(
            "UPDATE users
             SET {}, updated_at = datetime('now'), last_modified = datetime('now'), synced = 0
             WHERE id = ?",
            assignments.join(", ")
        );
        let changed = {
            let conn = self.db.connection()?;
            conn.execute(&sql, params_from_iter(values))
                .map_err(|e| write_error(e, email.as_deref().unwrap_or_default(), "update user"))?
        };
        if changed == 0 {
            return Err(Error::NotFound(format!("user with id {id}")));
        }
        self.get(id)
    }

    pub fn delete(&self, id: i64) -> Result<()> {
        let conn = self.db.connection()?;
        let changed = conn
            .execute("DELETE FROM users WHERE id = ?1", params![id])
            .map_err(|e| Error::Database(format!("failed to delete user: {e}")))?;
        if changed == 0 {
            return Err(Error::NotFound(format!("user with id {id}")));
        }
        Ok(())
    }

    /// Users changed since the last sync, oldest change first.
    pub fn needing_sync(&self) -> Result<Vec<User>> {
        self.query(
            &format!(
                "SELECT {USER_COLUMNS} FROM users WHERE synced = 0 ORDER BY last_modified ASC, id ASC"
            ),
            Vec::new(),
        )
    }

    pub fn mark_synced(&self, id: i64) -> Result<()> {
        let conn = self.db.connection()?;
        let changed = conn
            .execute("UPDATE users SET synced = 1 WHERE id = ?1", params![id])
            .map_err(|e| Error::Database(format!("failed to mark user synced: {e}")))?;
        if changed == 0 {
            return Err(Error::NotFound(format!("user with id {id}")));
        }
        Ok(())
    }

    fn query(&self, sql: &str, values: Vec<Value>) -> Result<Vec<User>> {
        let conn = self.db.connection()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params_from_iter(values), map_user)
            .map_err(|e| Error::Database(format!("failed to query users: {e}")))?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row.map_err(|e| Error::Database(format!("failed to read user row: {e}")))?);
        }
        Ok(users)
    }
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        avatar_url: row.get(3)?,
        created_at: datetime_column(row, 4)?,
        updated_at: datetime_column(row, 5)?,
        synced: row.get(6)?,
        last_modified: datetime_column(row, 7)?,
    })
}

fn write_error(err: rusqlite::Error, email: &str, action: &str) -> Error {
    if is_constraint_violation(&err) {
        Error::Validation(format!("email already registered: {email}"))
    } else {
        Error::Database(format!("failed to {action}: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(name: &str, email: &str) -> NewUser {
        NewUser {
            name: name.into(),
            email: email.into(),
            avatar_url: None,
        }
    }

    #[test]
    fn create_and_get_user_round_trip() {
        let db = Database::in_memory().unwrap();
        let users = db.users();
        let created = users
            .create(NewUser {
                avatar_url: Some("https://cdn.example.com/aoi.png".into()),
                ..new_user("Aoi", "aoi@example.com")
            })
            .unwrap();

        let fetched = users.get(created.id).unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.name, "Aoi");
        assert_eq!(
            fetched.avatar_url.as_deref(),
            Some("https://cdn.example.com/aoi.png")
        );
        assert!(!fetched.synced);
    }

    #[test]
    fn get_missing_user_is_not_found() {
        let db = Database::in_memory().unwrap();
        assert!(matches!(db.users().get(42), Err(Error::NotFound(_))));
    }

    #[test]
    fn rejects_invalid_input() {
        let db = Database::in_memory().unwrap();
        let users = db.users();
        assert!(matches!(
            users.create(new_user("", "a@example.com")),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            users.create(new_user("Aoi", "nope")),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            users.create(NewUser {
                avatar_url: Some("not a url".into()),
                ..new_user("Aoi", "a@example.com")
            }),
            Err(Error::Validation(_))
        ));
        assert!(users.list().unwrap().is_empty());
    }

    #[test]
    fn duplicate_email_is_a_validation_error() {
        let db = Database::in_memory().unwrap();
        let users = db.users();
        users.create(new_user("Aoi", "aoi@example.com")).unwrap();
        let err = users.create(new_user("Other", "aoi@example.com")).unwrap_err();
        assert!(err.to_string().contains("email already registered"));
    }

    #[test]
    fn get_by_email() {
        let db = Database::in_memory().unwrap();
        let users = db.users();
        let created = users.create(new_user("Aoi", "aoi@example.com")).unwrap();

        assert_eq!(
            users.get_by_email("aoi@example.com").unwrap().map(|u| u.id),
            Some(created.id)
        );
        assert!(users.get_by_email("nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn update_changes_only_given_fields_and_clears_sync() {
        let db = Database::in_memory().unwrap();
        let users = db.users();
        let created = users
            .create(NewUser {
                avatar_url: Some("https://cdn.example.com/a.png".into()),
                ..new_user("Aoi", "aoi@example.com")
            })
            .unwrap();
        users.mark_synced(created.id).unwrap();

        let updated = users
            .update(
                created.id,
                UserUpdate {
                    name: Some("Aoi K.".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Aoi K.");
        assert_eq!(updated.email, "aoi@example.com");
        assert_eq!(updated.avatar_url, created.avatar_url);
        assert!(!updated.synced);

        let cleared = users
            .update(
                created.id,
                UserUpdate {
                    avatar_url: Some(None),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(cleared.avatar_url.is_none());
    }

    #[test]
    fn empty_update_returns_current_row() {
        let db = Database::in_memory().unwrap();
        let users = db.users();
        let created = users.create(new_user("Aoi", "aoi@example.com")).unwrap();
        users.mark_synced(created.id).unwrap();

        let same = users.update(created.id, UserUpdate::default()).unwrap();
        assert!(same.synced);
    }

    #[test]
    fn update_missing_user_is_not_found() {
        let db = Database::in_memory().unwrap();
        let err = db
            .users()
            .update(
                9,
                UserUpdate {
                    name: Some("Ghost".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn delete_user() {
        let db = Database::in_memory().unwrap();
        let users = db.users();
        let created = users.create(new_user("Aoi", "aoi@example.com")).unwrap();

        users.delete(created.id).unwrap();
        assert!(matches!(users.get(created.id), Err(Error::NotFound(_))));
        assert!(matches!(users.delete(created.id), Err(Error::NotFound(_))));
    }

    #[test]
    fn sync_queue_tracks_unsynced_users() {
        let db = Database::in_memory().unwrap();
        let users = db.users();
        let a = users.create(new_user("A", "a@example.com")).unwrap();
        let b = users.create(new_user("B", "b@example.com")).unwrap();

        let pending: Vec<i64> = users.needing_sync().unwrap().iter().map(|u| u.id).collect();
        assert_eq!(pending, vec![a.id, b.id]);

        users.mark_synced(a.id).unwrap();
        let pending: Vec<i64> = users.needing_sync().unwrap().iter().map(|u| u.id).collect();
        assert_eq!(pending, vec![b.id]);
    }

    #[test]
    fn list_is_newest_first() {
        let db = Database::in_memory().unwrap();
        let users = db.users();
        let a = users.create(new_user("A", "a@example.com")).unwrap();
        let b = users.create(new_user("B", "b@example.com")).unwrap();

        let ids: Vec<i64> = users.list().unwrap().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }
}
