use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{CommentsRepo, CreateCommentParams, RepoError},
    domain::entities::CommentRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const COMMENT_COLUMNS: &str =
    "c.id, c.post_id, c.author_id, u.username AS author_username, c.text, c.created_at";

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: Uuid,
    post_id: Uuid,
    author_id: Uuid,
    author_username: String,
    text: String,
    created_at: OffsetDateTime,
}

impl From<CommentRow> for CommentRecord {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            post_id: row.post_id,
            author_id: row.author_id,
            author_username: row.author_username,
            text: row.text,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl CommentsRepo for PostgresRepositories {
    async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<CommentRecord>, RepoError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {COMMENT_COLUMNS} FROM comments c \
             INNER JOIN users u ON u.id = c.author_id \
             WHERE c.post_id = "
        ));
        qb.push_bind(post_id);
        qb.push(" ORDER BY c.created_at ASC, c.id ASC");

        let rows = qb
            .build_query_as::<CommentRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CommentRecord::from).collect())
    }

    async fn create_comment(&self, params: CreateCommentParams) -> Result<CommentRecord, RepoError> {
        let mut qb =
            QueryBuilder::new("INSERT INTO comments (post_id, author_id, text) VALUES (");
        qb.push_bind(params.post_id);
        qb.push(", ");
        qb.push_bind(params.author_id);
        qb.push(", ");
        qb.push_bind(params.text);
        qb.push(") RETURNING id");

        let (id,): (Uuid,) = qb
            .build_query_as()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut fetch = QueryBuilder::new(format!(
            "SELECT {COMMENT_COLUMNS} FROM comments c \
             INNER JOIN users u ON u.id = c.author_id \
             WHERE c.id = "
        ));
        fetch.push_bind(id);

        let row = fetch
            .build_query_as::<CommentRow>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }
}
