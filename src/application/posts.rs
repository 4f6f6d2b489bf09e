//! Post authoring: create, edit and delete, plus attachment cleanup.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::application::repos::{
    CreatePostParams, GroupsRepo, PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams,
};
use crate::domain::entities::PostRecord;

/// Hook invoked after a post mutation commits, with the previous and current
/// attachment paths. Implementations delete orphaned files; failures must not
/// surface to the caller because the database change already happened.
#[async_trait]
pub trait AttachmentCleanup: Send + Sync {
    async fn attachment_replaced(&self, old: Option<&str>, new: Option<&str>);
}

/// Cleanup hook that does nothing. Useful when media storage is disabled.
pub struct NoopCleanup;

#[async_trait]
impl AttachmentCleanup for NoopCleanup {
    async fn attachment_replaced(&self, _old: Option<&str>, _new: Option<&str>) {}
}

#[derive(Debug, Error)]
pub enum PostError {
    #[error("post not found")]
    NotFound,
    #[error("user is not the author of post {post_id}")]
    NotAuthor { post_id: Uuid },
    #[error("invalid field `{field}`: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("unknown group")]
    UnknownGroup,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl PostError {
    fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

/// Input for creating or editing a post. The group is addressed by slug; the
/// image path points at a file already written to media storage.
#[derive(Debug, Clone, Default)]
pub struct NewPostInput {
    pub text: String,
    pub group: Option<String>,
    pub image_path: Option<String>,
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostsRepo>,
    posts_write: Arc<dyn PostsWriteRepo>,
    groups: Arc<dyn GroupsRepo>,
    cleanup: Arc<dyn AttachmentCleanup>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        posts_write: Arc<dyn PostsWriteRepo>,
        groups: Arc<dyn GroupsRepo>,
        cleanup: Arc<dyn AttachmentCleanup>,
    ) -> Self {
        Self {
            posts,
            posts_write,
            groups,
            cleanup,
        }
    }

    pub async fn create_post(
        &self,
        author_id: Uuid,
        input: NewPostInput,
    ) -> Result<PostRecord, PostError> {
        let text = validate_text(&input.text)?;
        let group_id = self.resolve_group(input.group.as_deref()).await?;

        let post = self
            .posts_write
            .create_post(CreatePostParams {
                author_id,
                text,
                group_id,
                image_path: input.image_path,
            })
            .await?;

        Ok(post)
    }

    /// Edit a post. Only the author may edit; anyone else gets
    /// [`PostError::NotAuthor`] so the handler can redirect to the detail
    /// page with the post untouched.
    pub async fn update_post(
        &self,
        editor_id: Uuid,
        post_id: Uuid,
        input: NewPostInput,
    ) -> Result<PostRecord, PostError> {
        let existing = self.authored(editor_id, post_id).await?;

        let text = validate_text(&input.text)?;
        let group_id = self.resolve_group(input.group.as_deref()).await?;

        // A submission without a new upload keeps the current attachment.
        let image_path = input.image_path.or_else(|| existing.image_path.clone());

        let updated = self
            .posts_write
            .update_post(UpdatePostParams {
                id: post_id,
                text,
                group_id,
                image_path: image_path.clone(),
            })
            .await?;

        if existing.image_path != updated.image_path {
            self.cleanup
                .attachment_replaced(existing.image_path.as_deref(), updated.image_path.as_deref())
                .await;
        }

        Ok(updated)
    }

    pub async fn delete_post(&self, editor_id: Uuid, post_id: Uuid) -> Result<(), PostError> {
        let existing = self.authored(editor_id, post_id).await?;

        self.posts_write.delete_post(post_id).await?;

        if existing.image_path.is_some() {
            self.cleanup
                .attachment_replaced(existing.image_path.as_deref(), None)
                .await;
        }

        Ok(())
    }

    pub async fn find_post(&self, post_id: Uuid) -> Result<Option<PostRecord>, PostError> {
        Ok(self.posts.find_by_id(post_id).await?)
    }

    async fn authored(&self, editor_id: Uuid, post_id: Uuid) -> Result<PostRecord, PostError> {
        let post = self
            .posts
            .find_by_id(post_id)
            .await?
            .ok_or(PostError::NotFound)?;
        if post.author_id != editor_id {
            return Err(PostError::NotAuthor { post_id });
        }
        Ok(post)
    }

    async fn resolve_group(&self, slug: Option<&str>) -> Result<Option<Uuid>, PostError> {
        match slug {
            None | Some("") => Ok(None),
            Some(slug) => {
                let group = self
                    .groups
                    .find_by_slug(slug)
                    .await?
                    .ok_or(PostError::UnknownGroup)?;
                Ok(Some(group.id))
            }
        }
    }
}

fn validate_text(text: &str) -> Result<String, PostError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(PostError::validation("text", "post text must not be empty"));
    }
    Ok(trimmed.to_string())
}
