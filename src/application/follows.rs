//! Follow graph mutations.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::application::repos::{FollowsRepo, RepoError, UsersRepo};
use crate::domain::entities::UserRecord;

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("users cannot follow themselves")]
    SelfFollow,
    #[error("unknown user")]
    UnknownUser,
    #[error("not following this author")]
    NotFollowing,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct FollowService {
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
}

impl FollowService {
    pub fn new(users: Arc<dyn UsersRepo>, follows: Arc<dyn FollowsRepo>) -> Self {
        Self { users, follows }
    }

    /// Make `user_id` follow the author named `author_username`.
    ///
    /// Following an already-followed author is a no-op; following yourself is
    /// rejected. Returns the author so callers can redirect to their profile.
    pub async fn follow(
        &self,
        user_id: Uuid,
        author_username: &str,
    ) -> Result<UserRecord, FollowError> {
        let author = self.resolve_author(author_username).await?;
        if author.id == user_id {
            return Err(FollowError::SelfFollow);
        }

        self.follows.insert_follow(user_id, author.id).await?;
        Ok(author)
    }

    /// Remove the follow edge. Fails with [`FollowError::NotFollowing`] when
    /// the edge does not exist.
    pub async fn unfollow(
        &self,
        user_id: Uuid,
        author_username: &str,
    ) -> Result<UserRecord, FollowError> {
        let author = self.resolve_author(author_username).await?;

        match self.follows.delete_follow(user_id, author.id).await {
            Ok(()) => Ok(author),
            Err(RepoError::NotFound) => Err(FollowError::NotFollowing),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn is_following(
        &self,
        user_id: Uuid,
        author_id: Uuid,
    ) -> Result<bool, FollowError> {
        Ok(self.follows.is_following(user_id, author_id).await?)
    }

    async fn resolve_author(&self, username: &str) -> Result<UserRecord, FollowError> {
        self.users
            .find_by_username(username)
            .await?
            .ok_or(FollowError::UnknownUser)
    }
}
