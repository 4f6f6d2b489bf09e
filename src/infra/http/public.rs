use std::{io::ErrorKind, sync::Arc};

use axum::{
    Form, Json, Router,
    body::Body,
    extract::{
        DefaultBodyLimit, Multipart, Path, Query, State,
        multipart::MultipartError,
    },
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use bytes::Bytes;
use futures::stream;
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use crate::{
    application::{
        comments::{CommentError, CommentService},
        error::HttpError,
        feed::{FeedError, FeedService},
        follows::{FollowError, FollowService},
        pagination::PageRequest,
        posts::{NewPostInput, PostError, PostService},
        repos::{GroupsRepo, UsersRepo},
    },
    infra::{
        cache::{CacheState, page_cache_layer},
        db::PostgresRepositories,
        images::{ImageStorage, ImageStorageError},
    },
    presentation::views::{
        FeedPage, FormErrors, GroupFeedView, GroupView, PostDetailView, PostFormView, PostView,
        ProfileView,
    },
};

use super::{
    auth::{CurrentUser, MaybeUser},
    db_health_response,
    middleware::{log_responses, set_request_context},
    repo_error_to_http,
};

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub posts: Arc<PostService>,
    pub comments: Arc<CommentService>,
    pub follows: Arc<FollowService>,
    pub users: Arc<dyn UsersRepo>,
    pub groups: Arc<dyn GroupsRepo>,
    pub images: Arc<ImageStorage>,
    pub db: Option<Arc<PostgresRepositories>>,
    pub cache: Option<CacheState>,
    pub page_size: u32,
    pub max_request_bytes: usize,
}

pub fn build_router(state: HttpState) -> Router {
    // Only the front page goes through the TTL cache.
    let cached_routes = Router::new().route("/", get(index));
    let cached_routes = if let Some(cache_state) = state.cache.clone() {
        cached_routes.layer(middleware::from_fn_with_state(
            cache_state,
            page_cache_layer,
        ))
    } else {
        cached_routes
    };

    let routes = Router::new()
        .route("/group/{slug}/", get(group_feed))
        .route("/profile/{username}/", get(profile))
        .route("/profile/{username}/follow/", get(follow_author))
        .route("/profile/{username}/unfollow/", get(unfollow_author))
        .route("/posts/{id}/", get(post_detail))
        .route("/posts/{id}/comment/", axum::routing::post(add_comment))
        .route("/posts/{id}/edit/", get(edit_form).post(edit_post))
        .route("/create/", get(create_form).post(create_post))
        .route("/follow/", get(personal_feed))
        .route("/media/{*path}", get(serve_media))
        .route("/_health/db", get(health))
        .layer(DefaultBodyLimit::max(state.max_request_bytes));

    cached_routes
        .merge(routes)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PageQuery {
    page: Option<u32>,
}

impl HttpState {
    fn page_request(&self, query: &PageQuery) -> PageRequest {
        PageRequest::new(query.page.unwrap_or(1), self.page_size)
    }
}

fn feed_error_to_response(source: &'static str, err: FeedError) -> Response {
    match err {
        FeedError::UnknownGroup => HttpError::new(
            source,
            StatusCode::NOT_FOUND,
            "Group not found",
            "group slug did not match any group",
        )
        .into_response(),
        FeedError::UnknownUser => HttpError::new(
            source,
            StatusCode::NOT_FOUND,
            "User not found",
            "username did not match any user",
        )
        .into_response(),
        FeedError::Repo(err) => repo_error_to_http(source, err).into_response(),
    }
}

async fn index(State(state): State<HttpState>, Query(query): Query<PageQuery>) -> Response {
    match state.feed.index(state.page_request(&query)).await {
        Ok(page) => Json(FeedPage::from(page)).into_response(),
        Err(err) => feed_error_to_response("infra::http::public::index", err),
    }
}

async fn group_feed(
    State(state): State<HttpState>,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    match state
        .feed
        .group_feed(&slug, state.page_request(&query))
        .await
    {
        Ok((group, page)) => Json(GroupFeedView {
            group: group.into(),
            feed: page.into(),
        })
        .into_response(),
        Err(err) => feed_error_to_response("infra::http::public::group_feed", err),
    }
}

async fn profile(
    State(state): State<HttpState>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
    MaybeUser(viewer): MaybeUser,
) -> Response {
    let viewer_id = viewer.map(|user| user.id);
    match state
        .feed
        .profile(&username, viewer_id, state.page_request(&query))
        .await
    {
        Ok(profile) => Json(ProfileView::new(
            profile.author,
            profile.page,
            profile.following,
            profile.followers,
            profile.following_count,
        ))
        .into_response(),
        Err(err) => feed_error_to_response("infra::http::public::profile", err),
    }
}

fn follow_error_to_response(source: &'static str, err: FollowError) -> Response {
    match err {
        FollowError::SelfFollow => HttpError::new(
            source,
            StatusCode::BAD_REQUEST,
            "Cannot follow yourself",
            "self-follow rejected",
        )
        .into_response(),
        FollowError::UnknownUser => HttpError::new(
            source,
            StatusCode::NOT_FOUND,
            "User not found",
            "username did not match any user",
        )
        .into_response(),
        FollowError::NotFollowing => HttpError::new(
            source,
            StatusCode::NOT_FOUND,
            "Not following",
            "no follow edge to remove",
        )
        .into_response(),
        FollowError::Repo(err) => repo_error_to_http(source, err).into_response(),
    }
}

async fn follow_author(
    State(state): State<HttpState>,
    Path(username): Path<String>,
    CurrentUser(user): CurrentUser,
) -> Response {
    match state.follows.follow(user.id, &username).await {
        Ok(author) => Redirect::to(&format!("/profile/{}/", author.username)).into_response(),
        Err(err) => follow_error_to_response("infra::http::public::follow_author", err),
    }
}

async fn unfollow_author(
    State(state): State<HttpState>,
    Path(username): Path<String>,
    CurrentUser(user): CurrentUser,
) -> Response {
    match state.follows.unfollow(user.id, &username).await {
        Ok(author) => Redirect::to(&format!("/profile/{}/", author.username)).into_response(),
        Err(err) => follow_error_to_response("infra::http::public::unfollow_author", err),
    }
}

async fn personal_feed(
    State(state): State<HttpState>,
    Query(query): Query<PageQuery>,
    CurrentUser(user): CurrentUser,
) -> Response {
    match state
        .feed
        .personal_feed(user.id, state.page_request(&query))
        .await
    {
        Ok(page) => Json(FeedPage::from(page)).into_response(),
        Err(err) => feed_error_to_response("infra::http::public::personal_feed", err),
    }
}

fn post_not_found(source: &'static str) -> Response {
    HttpError::new(
        source,
        StatusCode::NOT_FOUND,
        "Post not found",
        "post id did not match any post",
    )
    .into_response()
}

async fn post_detail(State(state): State<HttpState>, Path(id): Path<Uuid>) -> Response {
    const SOURCE: &str = "infra::http::public::post_detail";

    let post = match state.posts.find_post(id).await {
        Ok(Some(post)) => post,
        Ok(None) => return post_not_found(SOURCE),
        Err(err) => return post_error_to_response(SOURCE, err),
    };

    let comments = match state.comments.list(id).await {
        Ok(comments) => comments,
        Err(CommentError::Repo(err)) => return repo_error_to_http(SOURCE, err).into_response(),
        Err(err) => {
            return HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load comments",
                &err,
            )
            .into_response();
        }
    };

    Json(PostDetailView {
        post: PostView::from(post),
        comments: comments.into_iter().map(Into::into).collect(),
    })
    .into_response()
}

#[derive(Debug, Deserialize)]
struct CommentForm {
    text: String,
}

async fn add_comment(
    State(state): State<HttpState>,
    Path(id): Path<Uuid>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<CommentForm>,
) -> Response {
    const SOURCE: &str = "infra::http::public::add_comment";

    match state.comments.add(user.id, id, &form.text).await {
        Ok(_) => Redirect::to(&format!("/posts/{id}/")).into_response(),
        Err(CommentError::UnknownPost) => post_not_found(SOURCE),
        Err(CommentError::EmptyText) => (
            StatusCode::BAD_REQUEST,
            Json(FormErrors::single("text", "comment text must not be empty")),
        )
            .into_response(),
        Err(CommentError::Repo(err)) => repo_error_to_http(SOURCE, err).into_response(),
    }
}

fn post_error_to_response(source: &'static str, err: PostError) -> Response {
    match err {
        PostError::NotFound => post_not_found(source),
        PostError::NotAuthor { post_id } => {
            Redirect::to(&format!("/posts/{post_id}/")).into_response()
        }
        PostError::Validation { field, message } => {
            (StatusCode::BAD_REQUEST, Json(FormErrors::single(field, message))).into_response()
        }
        PostError::UnknownGroup => (
            StatusCode::BAD_REQUEST,
            Json(FormErrors::single("group", "unknown group")),
        )
            .into_response(),
        PostError::Repo(err) => repo_error_to_http(source, err).into_response(),
    }
}

async fn group_choices(state: &HttpState, source: &'static str) -> Result<Vec<GroupView>, Response> {
    state
        .groups
        .list_groups()
        .await
        .map(|groups| groups.into_iter().map(GroupView::from).collect())
        .map_err(|err| repo_error_to_http(source, err).into_response())
}

async fn create_form(State(state): State<HttpState>, CurrentUser(_): CurrentUser) -> Response {
    const SOURCE: &str = "infra::http::public::create_form";

    match group_choices(&state, SOURCE).await {
        Ok(groups) => Json(PostFormView {
            groups,
            text: String::new(),
            group: None,
            image: None,
        })
        .into_response(),
        Err(response) => response,
    }
}

/// Fields accepted by the create and edit forms. An uploaded image is
/// streamed into storage while the body is read.
#[derive(Debug, Default)]
struct PostFormData {
    text: String,
    group: Option<String>,
    image_path: Option<String>,
}

fn multipart_error_response(source: &'static str, err: &MultipartError) -> Response {
    let error = match err.status() {
        StatusCode::PAYLOAD_TOO_LARGE => HttpError::new(
            source,
            StatusCode::PAYLOAD_TOO_LARGE,
            "Upload too large",
            err.to_string(),
        ),
        _ => HttpError::new(
            source,
            StatusCode::BAD_REQUEST,
            "Malformed multipart body",
            err.to_string(),
        ),
    };
    error.into_response()
}

async fn read_post_form(state: &HttpState, mut multipart: Multipart) -> Result<PostFormData, Response> {
    const SOURCE: &str = "infra::http::public::read_post_form";

    let mut form = PostFormData::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return Err(multipart_error_response(SOURCE, &err)),
        };

        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match name.as_str() {
            "text" => match field.text().await {
                Ok(value) => form.text = value,
                Err(err) => return Err(multipart_error_response(SOURCE, &err)),
            },
            "group" => match field.text().await {
                Ok(value) => {
                    let trimmed = value.trim().to_string();
                    form.group = (!trimmed.is_empty()).then_some(trimmed);
                }
                Err(err) => return Err(multipart_error_response(SOURCE, &err)),
            },
            "image" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "image".to_string());

                let chunks = stream::unfold(field, |mut field| async move {
                    match field.chunk().await {
                        Ok(Some(chunk)) => Some((Ok(chunk), field)),
                        Ok(None) => None,
                        Err(err) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => Some((
                            Err(ImageStorageError::PayloadTooLarge {
                                source: Box::new(err),
                            }),
                            field,
                        )),
                        Err(err) => Some((
                            Err(ImageStorageError::PayloadStream {
                                source: Box::new(err),
                            }),
                            field,
                        )),
                    }
                });

                match state.images.store_stream(&filename, chunks).await {
                    Ok(stored) => form.image_path = Some(stored.stored_path),
                    Err(ImageStorageError::EmptyPayload) => {}
                    Err(ImageStorageError::PayloadTooLarge { source }) => {
                        return Err(HttpError::new(
                            SOURCE,
                            StatusCode::PAYLOAD_TOO_LARGE,
                            "Upload too large",
                            source.to_string(),
                        )
                        .into_response());
                    }
                    Err(err) => {
                        error!(target = SOURCE, error = %err, "failed to store uploaded image");
                        return Err(HttpError::new(
                            SOURCE,
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "Failed to store image",
                            err.to_string(),
                        )
                        .into_response());
                    }
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn create_post(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> Response {
    const SOURCE: &str = "infra::http::public::create_post";

    let form = match read_post_form(&state, multipart).await {
        Ok(form) => form,
        Err(response) => return response,
    };

    let input = NewPostInput {
        text: form.text,
        group: form.group,
        image_path: form.image_path,
    };

    match state.posts.create_post(user.id, input).await {
        Ok(_) => Redirect::to(&format!("/profile/{}/", user.username)).into_response(),
        Err(err) => post_error_to_response(SOURCE, err),
    }
}

async fn edit_form(
    State(state): State<HttpState>,
    Path(id): Path<Uuid>,
    CurrentUser(user): CurrentUser,
) -> Response {
    const SOURCE: &str = "infra::http::public::edit_form";

    let post = match state.posts.find_post(id).await {
        Ok(Some(post)) => post,
        Ok(None) => return post_not_found(SOURCE),
        Err(err) => return post_error_to_response(SOURCE, err),
    };

    if post.author_id != user.id {
        return Redirect::to(&format!("/posts/{id}/")).into_response();
    }

    match group_choices(&state, SOURCE).await {
        Ok(groups) => Json(PostFormView {
            groups,
            text: post.text,
            group: post.group_slug,
            image: post.image_path.map(|path| format!("/media/{path}")),
        })
        .into_response(),
        Err(response) => response,
    }
}

async fn edit_post(
    State(state): State<HttpState>,
    Path(id): Path<Uuid>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> Response {
    const SOURCE: &str = "infra::http::public::edit_post";

    let form = match read_post_form(&state, multipart).await {
        Ok(form) => form,
        Err(response) => return response,
    };

    let input = NewPostInput {
        text: form.text,
        group: form.group,
        image_path: form.image_path,
    };

    match state.posts.update_post(user.id, id, input).await {
        Ok(post) => Redirect::to(&format!("/posts/{}/", post.id)).into_response(),
        Err(err) => post_error_to_response(SOURCE, err),
    }
}

async fn serve_media(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_media";

    match state.images.read(&path).await {
        Ok(bytes) => build_media_response(&path, bytes),
        Err(ImageStorageError::InvalidPath) => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Image not found",
            "The requested image is not available",
        )
        .into_response(),
        Err(ImageStorageError::Io(err)) if err.kind() == ErrorKind::NotFound => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Image not found",
            "The requested image is not available",
        )
        .into_response(),
        Err(err) => {
            error!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to read stored image"
            );
            HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read image",
                err.to_string(),
            )
            .into_response()
        }
    }
}

fn build_media_response(path: &str, bytes: Bytes) -> Response {
    let mut response = Response::new(Body::from(bytes.clone()));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&bytes.len().to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}

async fn health(State(state): State<HttpState>) -> Response {
    match &state.db {
        Some(db) => db_health_response(db.health_check().await),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
