use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{CreateGroupParams, GroupsRepo, RepoError},
    domain::entities::GroupRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: Uuid,
    title: String,
    slug: String,
    description: String,
    created_at: OffsetDateTime,
}

impl From<GroupRow> for GroupRecord {
    fn from(row: GroupRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            slug: row.slug,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl GroupsRepo for PostgresRepositories {
    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let mut qb = QueryBuilder::new(
            "SELECT id, title, slug, description, created_at FROM groups ORDER BY title ASC",
        );

        let rows = qb
            .build_query_as::<GroupRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(GroupRecord::from).collect())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        let mut qb = QueryBuilder::new(
            "SELECT id, title, slug, description, created_at FROM groups WHERE slug = ",
        );
        qb.push_bind(slug);

        let row = qb
            .build_query_as::<GroupRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(GroupRecord::from))
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError> {
        let mut qb = QueryBuilder::new("SELECT EXISTS(SELECT 1 FROM groups WHERE slug = ");
        qb.push_bind(slug);
        qb.push(")");

        let (exists,): (bool,) = qb
            .build_query_as()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(exists)
    }

    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        let mut qb = QueryBuilder::new("INSERT INTO groups (title, slug, description) VALUES (");
        qb.push_bind(params.title);
        qb.push(", ");
        qb.push_bind(params.slug);
        qb.push(", ");
        qb.push_bind(params.description);
        qb.push(") RETURNING id, title, slug, description, created_at");

        let row = qb
            .build_query_as::<GroupRow>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }
}
