//! Read-side feed assembly: the index, group and profile listings plus the
//! personalized follow feed.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::application::pagination::{Page, PageRequest};
use crate::application::repos::{
    FollowsRepo, GroupsRepo, PostListScope, PostsRepo, RepoError, UsersRepo,
};
use crate::domain::entities::{GroupRecord, PostRecord, UserRecord};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("unknown group")]
    UnknownGroup,
    #[error("unknown user")]
    UnknownUser,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// A profile page: the author, their posts and the follow counters, plus the
/// viewer's follow status when a viewer is known.
#[derive(Debug, Clone)]
pub struct ProfileFeed {
    pub author: UserRecord,
    pub page: Page<PostRecord>,
    pub following: Option<bool>,
    pub followers: u64,
    pub following_count: u64,
}

#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostsRepo>,
    groups: Arc<dyn GroupsRepo>,
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        groups: Arc<dyn GroupsRepo>,
        users: Arc<dyn UsersRepo>,
        follows: Arc<dyn FollowsRepo>,
    ) -> Self {
        Self {
            posts,
            groups,
            users,
            follows,
        }
    }

    /// The front page: every post, newest first.
    pub async fn index(&self, page: PageRequest) -> Result<Page<PostRecord>, FeedError> {
        self.paged(PostListScope::All, page).await
    }

    /// Posts of one group, addressed by slug.
    pub async fn group_feed(
        &self,
        slug: &str,
        page: PageRequest,
    ) -> Result<(GroupRecord, Page<PostRecord>), FeedError> {
        let group = self
            .groups
            .find_by_slug(slug)
            .await?
            .ok_or(FeedError::UnknownGroup)?;
        let posts = self.paged(PostListScope::Group(group.id), page).await?;
        Ok((group, posts))
    }

    /// An author's profile listing. When `viewer` is present the result also
    /// says whether the viewer follows the author.
    pub async fn profile(
        &self,
        username: &str,
        viewer: Option<Uuid>,
        page: PageRequest,
    ) -> Result<ProfileFeed, FeedError> {
        let author = self
            .users
            .find_by_username(username)
            .await?
            .ok_or(FeedError::UnknownUser)?;

        let posts = self.paged(PostListScope::Author(author.id), page).await?;
        let followers = self.follows.count_followers(author.id).await?;
        let following_count = self.follows.count_following(author.id).await?;

        let following = match viewer {
            Some(viewer) if viewer != author.id => {
                Some(self.follows.is_following(viewer, author.id).await?)
            }
            _ => None,
        };

        Ok(ProfileFeed {
            author,
            page: posts,
            following,
            followers,
            following_count,
        })
    }

    /// Posts authored by anyone `user_id` follows.
    pub async fn personal_feed(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<PostRecord>, FeedError> {
        self.paged(PostListScope::FollowedBy(user_id), page).await
    }

    async fn paged(
        &self,
        scope: PostListScope,
        page: PageRequest,
    ) -> Result<Page<PostRecord>, FeedError> {
        let total = self.posts.count_posts(scope).await?;
        let items = self.posts.list_posts(scope, page).await?;
        Ok(Page::assemble(items, page, total))
    }
}
