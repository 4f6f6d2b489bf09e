//! Serializable view models for the JSON surface.

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::application::pagination::Page;
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRecord};

fn rfc3339(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_default()
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupView {
    pub title: String,
    pub slug: String,
    pub description: String,
}

impl From<GroupRecord> for GroupView {
    fn from(group: GroupRecord) -> Self {
        Self {
            title: group.title,
            slug: group.slug,
            description: group.description,
        }
    }
}

/// A group as it appears embedded in a post card.
#[derive(Debug, Clone, Serialize)]
pub struct PostGroupView {
    pub title: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    pub id: Uuid,
    pub text: String,
    pub pub_date: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<PostGroupView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl From<PostRecord> for PostView {
    fn from(post: PostRecord) -> Self {
        let group = match (post.group_slug, post.group_title) {
            (Some(slug), Some(title)) => Some(PostGroupView { title, slug }),
            _ => None,
        };

        Self {
            id: post.id,
            text: post.text,
            pub_date: rfc3339(post.pub_date),
            author: post.author_username,
            group,
            image: post.image_path.map(|path| format!("/media/{path}")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub id: Uuid,
    pub author: String,
    pub text: String,
    pub created_at: String,
}

impl From<CommentRecord> for CommentView {
    fn from(comment: CommentRecord) -> Self {
        Self {
            id: comment.id,
            author: comment.author_username,
            text: comment.text,
            created_at: rfc3339(comment.created_at),
        }
    }
}

/// Pagination controls rendered next to any feed.
#[derive(Debug, Clone, Serialize)]
pub struct PageMeta {
    pub number: u32,
    pub total_pages: u32,
    pub total_items: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl PageMeta {
    fn from_page<T>(page: &Page<T>) -> Self {
        Self {
            number: page.number,
            total_pages: page.total_pages,
            total_items: page.total_items,
            has_next: page.has_next(),
            has_previous: page.has_previous(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub posts: Vec<PostView>,
    pub page: PageMeta,
}

impl From<Page<PostRecord>> for FeedPage {
    fn from(page: Page<PostRecord>) -> Self {
        let meta = PageMeta::from_page(&page);
        Self {
            posts: page.items.into_iter().map(PostView::from).collect(),
            page: meta,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupFeedView {
    pub group: GroupView,
    #[serde(flatten)]
    pub feed: FeedPage,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub username: String,
    pub joined: String,
    pub followers: u64,
    pub following_count: u64,
    /// Whether the viewer follows this author. Absent for anonymous viewers
    /// and for the author's own profile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub following: Option<bool>,
    #[serde(flatten)]
    pub feed: FeedPage,
}

impl ProfileView {
    pub fn new(
        author: UserRecord,
        page: Page<PostRecord>,
        following: Option<bool>,
        followers: u64,
        following_count: u64,
    ) -> Self {
        Self {
            username: author.username,
            joined: rfc3339(author.created_at),
            followers,
            following_count,
            following,
            feed: page.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PostDetailView {
    #[serde(flatten)]
    pub post: PostView,
    pub comments: Vec<CommentView>,
}

/// Context for the post form: group choices plus any previously submitted
/// values, echoed back on validation failure.
#[derive(Debug, Clone, Serialize)]
pub struct PostFormView {
    pub groups: Vec<GroupView>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Field-level validation failures for form submissions.
#[derive(Debug, Clone, Serialize)]
pub struct FormErrors {
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FormErrors {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError {
                field: field.into(),
                message: message.into(),
            }],
        }
    }
}
