use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{RepoError, UsersRepo},
    domain::entities::UserRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    created_at: OffsetDateTime,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl UsersRepo for PostgresRepositories {
    async fn ensure_user(&self, username: &str) -> Result<UserRecord, RepoError> {
        let trimmed = username.trim();
        if trimmed.is_empty() {
            return Err(RepoError::InvalidInput {
                message: "username must not be empty".to_string(),
            });
        }

        // Upsert so a concurrent first-sight insert still returns the row.
        let mut qb = QueryBuilder::new("INSERT INTO users (username) VALUES (");
        qb.push_bind(trimmed);
        qb.push(
            ") ON CONFLICT (username) DO UPDATE SET username = EXCLUDED.username \
             RETURNING id, username, created_at",
        );

        let row = qb
            .build_query_as::<UserRow>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        let mut qb = QueryBuilder::new("SELECT id, username, created_at FROM users WHERE username = ");
        qb.push_bind(username);

        let row = qb
            .build_query_as::<UserRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(UserRecord::from))
    }
}
