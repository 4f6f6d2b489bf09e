//! In-memory repositories and router builders shared by the integration tests.

use std::collections::HashSet;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicI64, Ordering},
};

use async_trait::async_trait;
use brusio::application::comments::CommentService;
use brusio::application::feed::FeedService;
use brusio::application::follows::FollowService;
use brusio::application::pagination::PageRequest;
use brusio::application::posts::{AttachmentCleanup, PostService};
use brusio::application::repos::{
    CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams, FollowsRepo,
    GroupsRepo, PostListScope, PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams, UsersRepo,
};
use brusio::domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRecord};
use brusio::infra::cache::{CacheState, PageCache};
use brusio::infra::http::{HttpState, build_router};
use brusio::infra::images::ImageStorage;
use time::OffsetDateTime;
use uuid::Uuid;

/// Shared in-memory store backing every repository trait.
#[derive(Default)]
pub struct MemoryRepos {
    users: Mutex<Vec<UserRecord>>,
    groups: Mutex<Vec<GroupRecord>>,
    posts: Mutex<Vec<PostRecord>>,
    comments: Mutex<Vec<CommentRecord>>,
    follows: Mutex<HashSet<(Uuid, Uuid)>>,
    clock: AtomicI64,
}

impl MemoryRepos {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Monotonic timestamps so feed ordering is deterministic.
    fn tick(&self) -> OffsetDateTime {
        let seconds = self.clock.fetch_add(1, Ordering::SeqCst);
        OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(seconds)
    }

    pub fn seed_user(&self, username: &str) -> UserRecord {
        let user = UserRecord {
            id: Uuid::new_v4(),
            username: username.to_string(),
            created_at: self.tick(),
        };
        self.users.lock().unwrap().push(user.clone());
        user
    }

    pub fn seed_group(&self, title: &str, slug: &str) -> GroupRecord {
        let group = GroupRecord {
            id: Uuid::new_v4(),
            title: title.to_string(),
            slug: slug.to_string(),
            description: String::new(),
            created_at: self.tick(),
        };
        self.groups.lock().unwrap().push(group.clone());
        group
    }

    pub fn seed_post(&self, author: &UserRecord, group: Option<&GroupRecord>, text: &str) -> PostRecord {
        let post = PostRecord {
            id: Uuid::new_v4(),
            text: text.to_string(),
            pub_date: self.tick(),
            author_id: author.id,
            author_username: author.username.clone(),
            group_id: group.map(|g| g.id),
            group_slug: group.map(|g| g.slug.clone()),
            group_title: group.map(|g| g.title.clone()),
            image_path: None,
        };
        self.posts.lock().unwrap().push(post.clone());
        post
    }

    pub fn post_text(&self, id: Uuid) -> Option<String> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .find(|post| post.id == id)
            .map(|post| post.text.clone())
    }

    pub fn comment_count(&self, post_id: Uuid) -> usize {
        self.comments
            .lock()
            .unwrap()
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .count()
    }

    fn matches_scope(&self, post: &PostRecord, scope: PostListScope) -> bool {
        match scope {
            PostListScope::All => true,
            PostListScope::Group(group_id) => post.group_id == Some(group_id),
            PostListScope::Author(author_id) => post.author_id == author_id,
            PostListScope::FollowedBy(user_id) => self
                .follows
                .lock()
                .unwrap()
                .contains(&(user_id, post.author_id)),
        }
    }

    fn scoped_posts(&self, scope: PostListScope) -> Vec<PostRecord> {
        let mut posts: Vec<PostRecord> = self
            .posts
            .lock()
            .unwrap()
            .iter()
            .filter(|post| self.matches_scope(post, scope))
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
        posts
    }
}

#[async_trait]
impl UsersRepo for MemoryRepos {
    async fn ensure_user(&self, username: &str) -> Result<UserRecord, RepoError> {
        let existing = self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|user| user.username == username)
            .cloned();
        match existing {
            Some(user) => Ok(user),
            None => Ok(self.seed_user(username)),
        }
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }
}

#[async_trait]
impl GroupsRepo for MemoryRepos {
    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let mut groups = self.groups.lock().unwrap().clone();
        groups.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(groups)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        Ok(self
            .groups
            .lock()
            .unwrap()
            .iter()
            .find(|group| group.slug == slug)
            .cloned())
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError> {
        Ok(self
            .groups
            .lock()
            .unwrap()
            .iter()
            .any(|group| group.slug == slug))
    }

    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        if self.slug_exists(&params.slug).await? {
            return Err(RepoError::Duplicate {
                constraint: "groups_slug_key".to_string(),
            });
        }
        let group = GroupRecord {
            id: Uuid::new_v4(),
            title: params.title,
            slug: params.slug,
            description: params.description,
            created_at: self.tick(),
        };
        self.groups.lock().unwrap().push(group.clone());
        Ok(group)
    }
}

#[async_trait]
impl PostsRepo for MemoryRepos {
    async fn list_posts(
        &self,
        scope: PostListScope,
        page: PageRequest,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let posts = self.scoped_posts(scope);
        let start = page.offset() as usize;
        if start >= posts.len() {
            return Ok(Vec::new());
        }
        let end = (start + page.limit() as usize).min(posts.len());
        Ok(posts[start..end].to_vec())
    }

    async fn count_posts(&self, scope: PostListScope) -> Result<u64, RepoError> {
        Ok(self.scoped_posts(scope).len() as u64)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        Ok(self
            .posts
            .lock()
            .unwrap()
            .iter()
            .find(|post| post.id == id)
            .cloned())
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryRepos {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let author = self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|user| user.id == params.author_id)
            .cloned()
            .ok_or(RepoError::NotFound)?;
        let group = params.group_id.and_then(|group_id| {
            self.groups
                .lock()
                .unwrap()
                .iter()
                .find(|group| group.id == group_id)
                .cloned()
        });

        let post = PostRecord {
            id: Uuid::new_v4(),
            text: params.text,
            pub_date: self.tick(),
            author_id: author.id,
            author_username: author.username,
            group_id: group.as_ref().map(|g| g.id),
            group_slug: group.as_ref().map(|g| g.slug.clone()),
            group_title: group.as_ref().map(|g| g.title.clone()),
            image_path: params.image_path,
        };
        self.posts.lock().unwrap().push(post.clone());
        Ok(post)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let group = params.group_id.and_then(|group_id| {
            self.groups
                .lock()
                .unwrap()
                .iter()
                .find(|group| group.id == group_id)
                .cloned()
        });

        let mut posts = self.posts.lock().unwrap();
        let post = posts
            .iter_mut()
            .find(|post| post.id == params.id)
            .ok_or(RepoError::NotFound)?;

        post.text = params.text;
        post.group_id = group.as_ref().map(|g| g.id);
        post.group_slug = group.as_ref().map(|g| g.slug.clone());
        post.group_title = group.as_ref().map(|g| g.title.clone());
        post.image_path = params.image_path;

        Ok(post.clone())
    }

    async fn delete_post(&self, id: Uuid) -> Result<(), RepoError> {
        let mut posts = self.posts.lock().unwrap();
        let before = posts.len();
        posts.retain(|post| post.id != id);
        if posts.len() == before {
            return Err(RepoError::NotFound);
        }
        self.comments
            .lock()
            .unwrap()
            .retain(|comment| comment.post_id != id);
        Ok(())
    }
}

#[async_trait]
impl CommentsRepo for MemoryRepos {
    async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<CommentRecord>, RepoError> {
        let mut comments: Vec<CommentRecord> = self
            .comments
            .lock()
            .unwrap()
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(comments)
    }

    async fn create_comment(&self, params: CreateCommentParams) -> Result<CommentRecord, RepoError> {
        let author = self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|user| user.id == params.author_id)
            .cloned()
            .ok_or(RepoError::NotFound)?;

        let comment = CommentRecord {
            id: Uuid::new_v4(),
            post_id: params.post_id,
            author_id: author.id,
            author_username: author.username,
            text: params.text,
            created_at: self.tick(),
        };
        self.comments.lock().unwrap().push(comment.clone());
        Ok(comment)
    }
}

#[async_trait]
impl FollowsRepo for MemoryRepos {
    async fn insert_follow(&self, user_id: Uuid, author_id: Uuid) -> Result<bool, RepoError> {
        Ok(self.follows.lock().unwrap().insert((user_id, author_id)))
    }

    async fn delete_follow(&self, user_id: Uuid, author_id: Uuid) -> Result<(), RepoError> {
        if self.follows.lock().unwrap().remove(&(user_id, author_id)) {
            Ok(())
        } else {
            Err(RepoError::NotFound)
        }
    }

    async fn is_following(&self, user_id: Uuid, author_id: Uuid) -> Result<bool, RepoError> {
        Ok(self.follows.lock().unwrap().contains(&(user_id, author_id)))
    }

    async fn count_followers(&self, author_id: Uuid) -> Result<u64, RepoError> {
        Ok(self
            .follows
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, followed)| *followed == author_id)
            .count() as u64)
    }

    async fn count_following(&self, user_id: Uuid) -> Result<u64, RepoError> {
        Ok(self
            .follows
            .lock()
            .unwrap()
            .iter()
            .filter(|(follower, _)| *follower == user_id)
            .count() as u64)
    }
}

/// Cleanup hook that records every invocation instead of touching disk.
#[derive(Default)]
pub struct RecordingCleanup {
    pub calls: Mutex<Vec<(Option<String>, Option<String>)>>,
}

#[async_trait]
impl AttachmentCleanup for RecordingCleanup {
    async fn attachment_replaced(&self, old: Option<&str>, new: Option<&str>) {
        self.calls
            .lock()
            .unwrap()
            .push((old.map(str::to_string), new.map(str::to_string)));
    }
}

/// A fully-wired application over in-memory repositories.
pub struct TestApp {
    pub repos: Arc<MemoryRepos>,
    pub cleanup: Arc<RecordingCleanup>,
    pub cache: Option<CacheState>,
    pub state: HttpState,
    _media_dir: tempfile::TempDir,
}

impl TestApp {
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }
}

pub fn build_app(page_size: u32, cache_ttl: Option<std::time::Duration>) -> TestApp {
    let repos = MemoryRepos::new();
    let cleanup = Arc::new(RecordingCleanup::default());

    let media_dir = tempfile::tempdir().expect("tempdir");
    let images = Arc::new(ImageStorage::new(media_dir.path().to_path_buf()).expect("storage"));

    let users: Arc<dyn UsersRepo> = repos.clone();
    let groups: Arc<dyn GroupsRepo> = repos.clone();
    let posts_repo: Arc<dyn PostsRepo> = repos.clone();
    let posts_write: Arc<dyn PostsWriteRepo> = repos.clone();
    let comments_repo: Arc<dyn CommentsRepo> = repos.clone();
    let follows_repo: Arc<dyn FollowsRepo> = repos.clone();

    let feed = Arc::new(FeedService::new(
        posts_repo.clone(),
        groups.clone(),
        users.clone(),
        follows_repo.clone(),
    ));
    let posts = Arc::new(PostService::new(
        posts_repo.clone(),
        posts_write,
        groups.clone(),
        cleanup.clone(),
    ));
    let comments = Arc::new(CommentService::new(posts_repo, comments_repo));
    let follows = Arc::new(FollowService::new(users.clone(), follows_repo));

    let cache = cache_ttl.map(|ttl| CacheState {
        cache: PageCache::new(),
        ttl,
    });

    let state = HttpState {
        feed,
        posts,
        comments,
        follows,
        users,
        groups,
        images,
        db: None,
        cache: cache.clone(),
        page_size,
        max_request_bytes: 1024 * 1024,
    };

    TestApp {
        repos,
        cleanup,
        cache,
        state,
        _media_dir: media_dir,
    }
}
