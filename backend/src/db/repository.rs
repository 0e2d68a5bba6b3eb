//! Database repository for accounts, sessions and the student roster.
//!
//! Every roster mutation runs in one transaction together with the revision bump.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::errors::AppError;
use crate::models::{Account, MirrorRow, MirrorStatus, NewStudent, Role, Student};

/// A value produced by a committed roster mutation, with the revision it created.
#[derive(Debug, Clone)]
pub struct Committed<T> {
    pub value: T,
    pub revision_id: i64,
}

/// Server-side session handle. The cookie carries `id.secret`.
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub id: String,
    pub secret: String,
}

impl SessionToken {
    pub fn cookie_value(&self) -> String {
        format!("{}.{}", self.id, self.secret)
    }

    /// Split a cookie value back into id and secret.
    pub fn parse(raw: &str) -> Option<SessionToken> {
        let (id, secret) = raw.split_once('.')?;
        if id.is_empty() || secret.is_empty() {
            return None;
        }
        Some(SessionToken {
            id: id.to_string(),
            secret: secret.to_string(),
        })
    }
}

/// A stored session together with the account it belongs to.
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub secret: String,
    pub account: Account,
}

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the current roster revision.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("revision_id"))
    }

    // ==================== ACCOUNT OPERATIONS ====================

    /// Look up an account by its exact username.
    pub async fn find_account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Account>, AppError> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, role FROM accounts WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(account_from_row))
    }

    /// Create a new account. The password must already be hashed.
    pub async fn create_account(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<Account, AppError> {
        let now = Utc::now().to_rfc3339();

        let row = sqlx::query(
            "INSERT INTO accounts (username, password_hash, role, created_at) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(username)
        .bind(password_hash)
        .bind(role.as_str())
        .bind(&now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_or(e, "Username already exists"))?;

        Ok(Account {
            id: row.get("id"),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            role,
        })
    }

    // ==================== SESSION OPERATIONS ====================

    /// Open a new session for an account, valid for `ttl`. Expired sessions are
    /// pruned in the same transaction.
    pub async fn create_session(
        &self,
        account_id: i64,
        ttl: Duration,
    ) -> Result<SessionToken, AppError> {
        let token = SessionToken {
            id: uuid::Uuid::new_v4().simple().to_string(),
            secret: uuid::Uuid::new_v4().simple().to_string(),
        };
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let pruned = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(timestamp(now))
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if pruned > 0 {
            tracing::debug!("Pruned {} expired sessions", pruned);
        }

        sqlx::query(
            "INSERT INTO sessions (id, secret, account_id, created_at, expires_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&token.id)
        .bind(&token.secret)
        .bind(account_id)
        .bind(timestamp(now))
        .bind(timestamp(now + ttl))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(token)
    }

    /// Load an unexpired session and its account. The caller checks the secret.
    pub async fn find_session(&self, id: &str) -> Result<Option<StoredSession>, AppError> {
        let row = sqlx::query(
            "SELECT s.secret, a.id, a.username, a.password_hash, a.role FROM sessions s JOIN accounts a ON a.id = s.account_id WHERE s.id = ? AND s.expires_at > ?",
        )
        .bind(id)
        .bind(timestamp(Utc::now()))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| StoredSession {
            secret: row.get("secret"),
            account: account_from_row(&row),
        }))
    }

    /// Delete a session. Deleting an unknown session is not an error.
    pub async fn delete_session(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ==================== STUDENT OPERATIONS ====================

    /// List all students in insertion order.
    pub async fn list_students(&self) -> Result<Vec<Student>, AppError> {
        let rows = sqlx::query("SELECT id, student_id, name, age FROM students ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(student_from_row).collect())
    }

    /// Add a single student.
    pub async fn add_student(&self, student: &NewStudent) -> Result<Committed<Student>, AppError> {
        let mut tx = self.pool.begin().await?;

        let created = insert_student(&mut tx, student).await?;
        let revision_id = bump_revision(&mut tx).await?;

        tx.commit().await?;

        Ok(Committed {
            value: created,
            revision_id,
        })
    }

    /// Add a batch of students atomically: either every row is stored or none is.
    pub async fn add_students(
        &self,
        students: &[NewStudent],
    ) -> Result<Committed<Vec<Student>>, AppError> {
        let mut tx = self.pool.begin().await?;

        let mut created = Vec::with_capacity(students.len());
        for student in students {
            // Returning early drops `tx`, which rolls back earlier inserts
            created.push(insert_student(&mut tx, student).await?);
        }

        // Increment revision once for the entire batch
        let revision_id = bump_revision(&mut tx).await?;

        tx.commit().await?;

        Ok(Committed {
            value: created,
            revision_id,
        })
    }

    /// Remove a student from the roster, keeping a tombstone for the mirror.
    pub async fn delete_student(
        &self,
        id: i64,
        deleted_by: &str,
    ) -> Result<Committed<Student>, AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT id, student_id, name, age FROM students WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let student = row
            .as_ref()
            .map(student_from_row)
            .ok_or_else(|| AppError::NotFound(format!("Student {} not found", id)))?;

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT OR REPLACE INTO student_tombstones (record_id, student_id, name, age, deleted_at, deleted_by) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(student.id)
        .bind(&student.student_id)
        .bind(&student.name)
        .bind(student.age)
        .bind(&now)
        .bind(deleted_by)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM students WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let revision_id = bump_revision(&mut tx).await?;

        tx.commit().await?;

        Ok(Committed {
            value: student,
            revision_id,
        })
    }

    /// Rows the spreadsheet mirror should contain, in record order.
    pub async fn mirror_rows(&self) -> Result<Vec<MirrorRow>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT id AS record_id, student_id, name, age, 'Active' AS status FROM students
            UNION ALL
            SELECT record_id, student_id, name, age, 'Deleted' AS status FROM student_tombstones
            ORDER BY record_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let status: String = row.get("status");
                MirrorRow {
                    student_id: row.get("student_id"),
                    name: row.get("name"),
                    age: row.get("age"),
                    status: MirrorStatus::parse(&status).unwrap_or(MirrorStatus::Active),
                }
            })
            .collect())
    }
}

async fn insert_student(
    conn: &mut SqliteConnection,
    student: &NewStudent,
) -> Result<Student, AppError> {
    let now = Utc::now().to_rfc3339();

    let row = sqlx::query(
        "INSERT INTO students (student_id, name, age, created_at) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(&student.student_id)
    .bind(&student.name)
    .bind(student.age)
    .bind(&now)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| {
        unique_or(
            e,
            &format!("Student ID {} already exists", student.student_id),
        )
    })?;

    // A re-admitted student replaces their old soft-deleted mirror row
    sqlx::query("DELETE FROM student_tombstones WHERE student_id = ?")
        .bind(&student.student_id)
        .execute(&mut *conn)
        .await?;

    Ok(Student {
        id: row.get("id"),
        student_id: student.student_id.clone(),
        name: student.name.clone(),
        age: student.age,
    })
}

async fn bump_revision(conn: &mut SqliteConnection) -> Result<i64, AppError> {
    let now = Utc::now().to_rfc3339();
    let row = sqlx::query(
        "UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1 RETURNING revision_id",
    )
    .bind(&now)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.get("revision_id"))
}

/// Fixed-width UTC timestamp, so stored values compare correctly as text.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn unique_or(err: sqlx::Error, conflict_message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(conflict_message.to_string())
        }
        _ => err.into(),
    }
}

// Helper functions for row conversion

fn account_from_row(row: &sqlx::sqlite::SqliteRow) -> Account {
    let role: String = row.get("role");
    Account {
        id: row.get("id"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        // The CHECK constraint only admits known roles
        role: Role::parse(&role).unwrap_or(Role::User),
    }
}

fn student_from_row(row: &sqlx::sqlite::SqliteRow) -> Student {
    Student {
        id: row.get("id"),
        student_id: row.get("student_id"),
        name: row.get("name"),
        age: row.get("age"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use tempfile::TempDir;

    async fn test_repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .unwrap();
        (Repository::new(pool), temp_dir)
    }

    fn new_student(student_id: &str, name: &str, age: u32) -> NewStudent {
        NewStudent {
            student_id: student_id.to_string(),
            name: name.to_string(),
            age,
        }
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let (repo, _dir) = test_repo().await;
        repo.create_account("alice", "hash", Role::User)
            .await
            .unwrap();

        let err = repo
            .create_account("alice", "other", Role::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let stored = repo.find_account_by_username("alice").await.unwrap().unwrap();
        assert_eq!(stored.role, Role::User);
        assert_eq!(stored.password_hash, "hash");
    }

    #[tokio::test]
    async fn test_session_roundtrip_and_delete() {
        let (repo, _dir) = test_repo().await;
        let account = repo
            .create_account("admin", "hash", Role::Admin)
            .await
            .unwrap();

        let token = repo
            .create_session(account.id, Duration::hours(1))
            .await
            .unwrap();
        let parsed = SessionToken::parse(&token.cookie_value()).unwrap();
        assert_eq!(parsed.id, token.id);

        let session = repo.find_session(&token.id).await.unwrap().unwrap();
        assert_eq!(session.secret, token.secret);
        assert_eq!(session.account.username, "admin");
        assert_eq!(session.account.role, Role::Admin);

        repo.delete_session(&token.id).await.unwrap();
        repo.delete_session(&token.id).await.unwrap();
        assert!(repo.find_session(&token.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_sessions_are_ignored_and_pruned() {
        let (repo, _dir) = test_repo().await;
        let account = repo
            .create_account("clerk", "hash", Role::User)
            .await
            .unwrap();

        let stale = repo
            .create_session(account.id, Duration::hours(-1))
            .await
            .unwrap();
        assert!(repo.find_session(&stale.id).await.unwrap().is_none());

        let fresh = repo
            .create_session(account.id, Duration::hours(1))
            .await
            .unwrap();
        assert!(repo.find_session(&fresh.id).await.unwrap().is_some());

        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM sessions")
            .fetch_one(&repo.pool)
            .await
            .unwrap()
            .get("n");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_batch_insert_is_atomic() {
        let (repo, _dir) = test_repo().await;
        repo.add_student(&new_student("7", "Existing", 19))
            .await
            .unwrap();
        let revision_before = repo.get_revision_id().await.unwrap();

        let err = repo
            .add_students(&[new_student("8", "Fresh", 18), new_student("7", "Clash", 20)])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let students = repo.list_students().await.unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].student_id, "7");
        assert_eq!(repo.get_revision_id().await.unwrap(), revision_before);
    }

    #[tokio::test]
    async fn test_delete_moves_record_to_tombstone() {
        let (repo, _dir) = test_repo().await;
        let first = repo.add_student(&new_student("S1", "Ann", 18)).await.unwrap();
        repo.add_student(&new_student("S2", "Ben", 19)).await.unwrap();

        let deleted = repo.delete_student(first.value.id, "admin").await.unwrap();
        assert_eq!(deleted.value.student_id, "S1");
        let remaining = repo.list_students().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].student_id, "S2");

        let rows = repo.mirror_rows().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].student_id, "S1");
        assert_eq!(rows[0].status, MirrorStatus::Deleted);
        assert_eq!(rows[1].status, MirrorStatus::Active);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let (repo, _dir) = test_repo().await;
        let err = repo.delete_student(42, "admin").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(repo.get_revision_id().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_readmission_clears_tombstone() {
        let (repo, _dir) = test_repo().await;
        let first = repo.add_student(&new_student("S1", "Ann", 18)).await.unwrap();
        repo.delete_student(first.value.id, "admin").await.unwrap();
        repo.add_student(&new_student("S1", "Ann", 19)).await.unwrap();

        let rows = repo.mirror_rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, MirrorStatus::Active);
        assert_eq!(rows[0].age, 19);
    }
}
