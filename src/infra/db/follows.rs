use async_trait::async_trait;
use sqlx::QueryBuilder;
use uuid::Uuid;

use crate::application::repos::{FollowsRepo, RepoError};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl FollowsRepo for PostgresRepositories {
    async fn insert_follow(&self, user_id: Uuid, author_id: Uuid) -> Result<bool, RepoError> {
        let mut qb = QueryBuilder::new("INSERT INTO follows (user_id, author_id) VALUES (");
        qb.push_bind(user_id);
        qb.push(", ");
        qb.push_bind(author_id);
        qb.push(") ON CONFLICT (user_id, author_id) DO NOTHING");

        let result = qb
            .build()
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_follow(&self, user_id: Uuid, author_id: Uuid) -> Result<(), RepoError> {
        let mut qb = QueryBuilder::new("DELETE FROM follows WHERE user_id = ");
        qb.push_bind(user_id);
        qb.push(" AND author_id = ");
        qb.push_bind(author_id);

        let result = qb
            .build()
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        Ok(())
    }

    async fn is_following(&self, user_id: Uuid, author_id: Uuid) -> Result<bool, RepoError> {
        let mut qb = QueryBuilder::new("SELECT EXISTS(SELECT 1 FROM follows WHERE user_id = ");
        qb.push_bind(user_id);
        qb.push(" AND author_id = ");
        qb.push_bind(author_id);
        qb.push(")");

        let (exists,): (bool,) = qb
            .build_query_as()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(exists)
    }

    async fn count_followers(&self, author_id: Uuid) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM follows WHERE author_id = ");
        qb.push_bind(author_id);

        let (count,): (i64,) = qb
            .build_query_as()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn count_following(&self, user_id: Uuid) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM follows WHERE user_id = ");
        qb.push_bind(user_id);

        let (count,): (i64,) = qb
            .build_query_as()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }
}
