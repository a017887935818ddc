//! User operations

use chrono::Utc;
use sqlx::Row;

use crate::error::DbError;
use crate::models::{NewUser, User};
use crate::repository::Database;

impl Database {
    /// Insert a new user
    ///
    /// The `UNIQUE` constraint on `username` decides between concurrent
    /// registrations; the loser gets `DbError::Duplicate`.
    pub async fn insert_user(&self, user: NewUser) -> Result<User, DbError> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO users (username, password_hash, role, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DbError::Duplicate(format!("User '{}' already exists", user.username))
            }
            e => DbError::Connection(e),
        })?;

        let id: i64 = result.get("id");

        Ok(User {
            id,
            username: user.username,
            password_hash: user.password_hash,
            role: user.role,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a user by username
    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, DbError> {
        let result = sqlx::query(
            r#"
            SELECT id, username, password_hash, role, created_at, updated_at
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        result.map(|row| User::try_from(&row).map_err(DbError::from)).transpose()
    }

    /// Check if any users exist
    pub async fn has_users(&self) -> Result<bool, DbError> {
        let result = sqlx::query("SELECT COUNT(*) as count FROM users")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = result.get("count");
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    async fn open_db(dir: &tempfile::TempDir) -> Database {
        let path = dir.path().join("users.db");
        Database::new(&format!("sqlite:{}?mode=rwc", path.display()))
            .await
            .unwrap()
    }

    fn new_user(username: &str, role: Role) -> NewUser {
        NewUser {
            username: username.to_string(),
            password_hash: "$argon2id$placeholder".to_string(),
            role,
        }
    }

    #[tokio::test]
    async fn test_insert_and_lookup_user() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(&dir).await;

        assert!(!db.has_users().await.unwrap());

        let user = db.insert_user(new_user("orga", Role::Organizer)).await.unwrap();
        assert_eq!(user.role, Role::Organizer);

        let found = db.get_user_by_username("orga").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.role, Role::Organizer);
        assert_eq!(found.password_hash, "$argon2id$placeholder");

        assert!(db.has_users().await.unwrap());
        assert!(db.get_user_by_username("prat").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(&dir).await;

        db.insert_user(new_user("prat", Role::Practitioner)).await.unwrap();
        let err = db.insert_user(new_user("prat", Role::Organizer)).await.unwrap_err();
        assert!(matches!(err, DbError::Duplicate(_)));

        let stored = db.get_user_by_username("prat").await.unwrap().unwrap();
        assert_eq!(stored.role, Role::Practitioner);
    }

    #[tokio::test]
    async fn test_concurrent_registrations_of_one_name() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(&dir).await;

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let db = db.clone();
                tokio::spawn(async move { db.insert_user(new_user("same", Role::Organizer)).await })
            })
            .collect();

        let mut inserted = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => inserted += 1,
                Err(DbError::Duplicate(_)) => duplicates += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(inserted, 1);
        assert_eq!(duplicates, 15);
    }

    #[tokio::test]
    async fn test_unknown_stored_role_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(&dir).await;

        sqlx::query(
            "INSERT INTO users (username, password_hash, role, created_at, updated_at) \
             VALUES ('legacy', 'x', 'ROLE_ADMIN', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        assert!(db.get_user_by_username("legacy").await.is_err());
    }
}
