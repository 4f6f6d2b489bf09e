//! Comments on posts. Comments are immutable once written.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::application::repos::{CommentsRepo, CreateCommentParams, PostsRepo, RepoError};
use crate::domain::entities::CommentRecord;

#[derive(Debug, Error)]
pub enum CommentError {
    #[error("post not found")]
    UnknownPost,
    #[error("comment text must not be empty")]
    EmptyText,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct CommentService {
    posts: Arc<dyn PostsRepo>,
    comments: Arc<dyn CommentsRepo>,
}

impl CommentService {
    pub fn new(posts: Arc<dyn PostsRepo>, comments: Arc<dyn CommentsRepo>) -> Self {
        Self { posts, comments }
    }

    pub async fn add(
        &self,
        author_id: Uuid,
        post_id: Uuid,
        text: &str,
    ) -> Result<CommentRecord, CommentError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(CommentError::EmptyText);
        }

        self.posts
            .find_by_id(post_id)
            .await?
            .ok_or(CommentError::UnknownPost)?;

        let comment = self
            .comments
            .create_comment(CreateCommentParams {
                post_id,
                author_id,
                text: trimmed.to_string(),
            })
            .await?;

        Ok(comment)
    }

    pub async fn list(&self, post_id: Uuid) -> Result<Vec<CommentRecord>, CommentError> {
        Ok(self.comments.list_for_post(post_id).await?)
    }
}
