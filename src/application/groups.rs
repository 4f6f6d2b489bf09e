//! Group provisioning, used by the `create-group` CLI command.

use std::sync::Arc;

use thiserror::Error;

use crate::application::repos::{CreateGroupParams, GroupsRepo, RepoError};
use crate::domain::entities::GroupRecord;
use crate::domain::slug::{SlugAsyncError, SlugError, derive_slug, generate_unique_slug};

#[derive(Debug, Error)]
pub enum GroupError {
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error("slug `{slug}` is already taken")]
    SlugTaken { slug: String },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct GroupService {
    groups: Arc<dyn GroupsRepo>,
}

impl GroupService {
    pub fn new(groups: Arc<dyn GroupsRepo>) -> Self {
        Self { groups }
    }

    /// Create a group. When `slug` is absent one is derived from the title,
    /// suffixed until unique; an explicit slug must be free.
    pub async fn create(
        &self,
        title: &str,
        slug: Option<&str>,
        description: &str,
    ) -> Result<GroupRecord, GroupError> {
        let slug = match slug {
            Some(explicit) => {
                let slug = derive_slug(explicit)?;
                if self.groups.slug_exists(&slug).await? {
                    return Err(GroupError::SlugTaken { slug });
                }
                slug
            }
            None => {
                let groups = Arc::clone(&self.groups);
                generate_unique_slug(title, move |candidate| {
                    let groups = Arc::clone(&groups);
                    let candidate = candidate.to_string();
                    async move { groups.slug_exists(&candidate).await.map(|exists| !exists) }
                })
                .await
                .map_err(|err| match err {
                    SlugAsyncError::Slug(err) => GroupError::Slug(err),
                    SlugAsyncError::Predicate(err) => GroupError::Repo(err),
                })?
            }
        };

        let group = self
            .groups
            .create_group(CreateGroupParams {
                title: title.trim().to_string(),
                slug,
                description: description.trim().to_string(),
            })
            .await?;

        Ok(group)
    }
}
