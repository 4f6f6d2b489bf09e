//! End-to-end routing checks over the in-memory application.

mod support;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use support::{TestApp, build_app};

const MULTIPART_BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

fn multipart_body(fields: &[(&str, &str)]) -> Body {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!("--{MULTIPART_BOUNDARY}--\r\n"));
    Body::from(body)
}

fn multipart_body_with_file(
    fields: &[(&str, &str)],
    filename: &str,
    content_type: &str,
    data: &[u8],
) -> Body {
    let mut body: Vec<u8> = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    Body::from(body)
}

fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}")
}

async fn get(app: &TestApp, uri: &str) -> (StatusCode, Bytes) {
    let response = app
        .router()
        .oneshot(Request::get(uri).body(Body::empty()).expect("request"))
        .await
        .expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    (status, bytes)
}

async fn get_as(app: &TestApp, uri: &str, username: &str) -> (StatusCode, Bytes) {
    let response = app
        .router()
        .oneshot(
            Request::get(uri)
                .header("x-forwarded-user", username)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    (status, bytes)
}

fn json(bytes: &Bytes) -> Value {
    serde_json::from_slice(bytes).expect("json body")
}

#[tokio::test]
async fn index_slices_posts_into_pages() {
    let app = build_app(5, None);
    let author = app.repos.seed_user("author");
    for index in 0..12 {
        app.repos.seed_post(&author, None, &format!("post-{index}"));
    }

    let (status, bytes) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&bytes);
    assert_eq!(body["posts"].as_array().expect("posts").len(), 5);
    assert_eq!(body["page"]["total_pages"], 3);
    assert_eq!(body["posts"][0]["text"], "post-11");

    let (_, bytes) = get(&app, "/?page=3").await;
    let body = json(&bytes);
    assert_eq!(body["posts"].as_array().expect("posts").len(), 2);
    assert_eq!(body["page"]["has_next"], false);

    // Out-of-range pages are empty, not errors.
    let (status, bytes) = get(&app, "/?page=9").await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&bytes);
    assert!(body["posts"].as_array().expect("posts").is_empty());
}

#[tokio::test]
async fn group_feed_filters_by_group_and_unknown_slug_is_404() {
    let app = build_app(10, None);
    let author = app.repos.seed_user("author");
    let group = app.repos.seed_group("Field Notes", "field-notes");
    app.repos.seed_post(&author, Some(&group), "grouped");
    app.repos.seed_post(&author, None, "ungrouped");

    let (status, bytes) = get(&app, "/group/field-notes/").await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&bytes);
    assert_eq!(body["group"]["slug"], "field-notes");
    assert_eq!(body["posts"].as_array().expect("posts").len(), 1);
    assert_eq!(body["posts"][0]["text"], "grouped");

    let (status, _) = get(&app, "/group/missing/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn profile_shows_follow_state_for_the_viewer() {
    let app = build_app(10, None);
    let reader = app.repos.seed_user("reader");
    let author = app.repos.seed_user("author");
    app.repos.seed_post(&author, None, "hello");

    app.state
        .follows
        .follow(reader.id, "author")
        .await
        .expect("follow");

    let (status, bytes) = get_as(&app, "/profile/author/", "reader").await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&bytes);
    assert_eq!(body["username"], "author");
    assert_eq!(body["following"], true);
    assert_eq!(body["followers"], 1);

    // Anonymous viewers get no follow flag.
    let (_, bytes) = get(&app, "/profile/author/").await;
    let body = json(&bytes);
    assert!(body.get("following").is_none());
}

#[tokio::test]
async fn anonymous_requests_to_protected_routes_redirect_to_login() {
    let app = build_app(10, None);

    let (status, _) = get(&app, "/create/").await;
    assert_eq!(status, StatusCode::SEE_OTHER);

    let response = app
        .router()
        .oneshot(Request::get("/create/").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok()),
        Some("/auth/login/?next=%2Fcreate%2F")
    );

    let (status, _) = get(&app, "/follow/").await;
    assert_eq!(status, StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn follow_routes_mutate_the_graph() {
    let app = build_app(10, None);
    let reader = app.repos.seed_user("reader");
    let author = app.repos.seed_user("author");

    let (status, _) = get_as(&app, "/profile/author/follow/", "reader").await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert!(
        app.state
            .follows
            .is_following(reader.id, author.id)
            .await
            .expect("status")
    );

    // Repeat follow stays a redirect.
    let (status, _) = get_as(&app, "/profile/author/follow/", "reader").await;
    assert_eq!(status, StatusCode::SEE_OTHER);

    let (status, _) = get_as(&app, "/profile/author/unfollow/", "reader").await;
    assert_eq!(status, StatusCode::SEE_OTHER);

    // Unfollowing again has no edge to remove.
    let (status, _) = get_as(&app, "/profile/author/unfollow/", "reader").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Following yourself is rejected.
    let (status, _) = get_as(&app, "/profile/reader/follow/", "reader").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn comments_are_created_and_listed_on_the_detail_page() {
    let app = build_app(10, None);
    let author = app.repos.seed_user("author");
    app.repos.seed_user("reader");
    let post = app.repos.seed_post(&author, None, "discuss");

    let response = app
        .router()
        .oneshot(
            Request::post(format!("/posts/{}/comment/", post.id))
                .header("x-forwarded-user", "reader")
                .header(
                    header::CONTENT_TYPE,
                    "application/x-www-form-urlencoded",
                )
                .body(Body::from("text=nice+post"))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(app.repos.comment_count(post.id), 1);

    let (status, bytes) = get(&app, &format!("/posts/{}/", post.id)).await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&bytes);
    assert_eq!(body["comments"][0]["text"], "nice post");
    assert_eq!(body["comments"][0]["author"], "reader");
}

#[tokio::test]
async fn blank_comments_are_rejected() {
    let app = build_app(10, None);
    let author = app.repos.seed_user("author");
    app.repos.seed_user("reader");
    let post = app.repos.seed_post(&author, None, "discuss");

    let response = app
        .router()
        .oneshot(
            Request::post(format!("/posts/{}/comment/", post.id))
                .header("x-forwarded-user", "reader")
                .header(
                    header::CONTENT_TYPE,
                    "application/x-www-form-urlencoded",
                )
                .body(Body::from("text=++"))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.repos.comment_count(post.id), 0);
}

#[tokio::test]
async fn non_author_edit_redirects_to_the_detail_page_unchanged() {
    let app = build_app(10, None);
    let author = app.repos.seed_user("author");
    app.repos.seed_user("intruder");
    let post = app.repos.seed_post(&author, None, "original");

    let response = app
        .router()
        .oneshot(
            Request::post(format!("/posts/{}/edit/", post.id))
                .header("x-forwarded-user", "intruder")
                .header(header::CONTENT_TYPE, multipart_content_type())
                .body(multipart_body(&[("text", "vandalized")]))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok()),
        Some(format!("/posts/{}/", post.id).as_str())
    );
    assert_eq!(app.repos.post_text(post.id).as_deref(), Some("original"));
}

#[tokio::test]
async fn authors_can_create_and_edit_posts_through_the_forms() {
    let app = build_app(10, None);
    app.repos.seed_user("author");
    app.repos.seed_group("Field Notes", "field-notes");

    let response = app
        .router()
        .oneshot(
            Request::post("/create/")
                .header("x-forwarded-user", "author")
                .header(header::CONTENT_TYPE, multipart_content_type())
                .body(multipart_body(&[
                    ("text", "fresh post"),
                    ("group", "field-notes"),
                ]))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let (_, bytes) = get(&app, "/group/field-notes/").await;
    let body = json(&bytes);
    assert_eq!(body["posts"][0]["text"], "fresh post");
    let post_id = body["posts"][0]["id"].as_str().expect("post id").to_string();

    let response = app
        .router()
        .oneshot(
            Request::post(format!("/posts/{post_id}/edit/"))
                .header("x-forwarded-user", "author")
                .header(header::CONTENT_TYPE, multipart_content_type())
                .body(multipart_body(&[("text", "revised post")]))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let (_, bytes) = get(&app, &format!("/posts/{post_id}/")).await;
    let body = json(&bytes);
    assert_eq!(body["text"], "revised post");
}

#[tokio::test]
async fn uploaded_images_are_stored_and_served() {
    let app = build_app(10, None);
    app.repos.seed_user("author");
    let image_bytes: &[u8] = b"\x89PNG\r\n\x1a\nfake image payload";

    let response = app
        .router()
        .oneshot(
            Request::post("/create/")
                .header("x-forwarded-user", "author")
                .header(header::CONTENT_TYPE, multipart_content_type())
                .body(multipart_body_with_file(
                    &[("text", "with picture")],
                    "Holiday Snap.PNG",
                    "image/png",
                    image_bytes,
                ))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let (_, bytes) = get(&app, "/").await;
    let body = json(&bytes);
    let image_url = body["posts"][0]["image"].as_str().expect("image url");
    assert!(image_url.starts_with("/media/"));
    assert!(image_url.ends_with(".png"));

    let response = app
        .router()
        .oneshot(Request::get(image_url).body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("image/png")
    );
    let served = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    assert_eq!(served.as_ref(), image_bytes);
}

#[tokio::test]
async fn oversized_uploads_are_rejected() {
    // build_app caps request bodies at 1 MiB.
    let app = build_app(10, None);
    app.repos.seed_user("author");
    let oversized = vec![0u8; 2 * 1024 * 1024];

    let response = app
        .router()
        .oneshot(
            Request::post("/create/")
                .header("x-forwarded-user", "author")
                .header(header::CONTENT_TYPE, multipart_content_type())
                .body(multipart_body_with_file(
                    &[("text", "too big")],
                    "huge.png",
                    "image/png",
                    &oversized,
                ))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let (_, bytes) = get(&app, "/").await;
    let body = json(&bytes);
    assert!(body["posts"].as_array().expect("posts").is_empty());
}

#[tokio::test]
async fn blank_post_text_is_a_field_error() {
    let app = build_app(10, None);
    app.repos.seed_user("author");

    let response = app
        .router()
        .oneshot(
            Request::post("/create/")
                .header("x-forwarded-user", "author")
                .header(header::CONTENT_TYPE, multipart_content_type())
                .body(multipart_body(&[("text", "   ")]))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let body = json(&bytes);
    assert_eq!(body["errors"][0]["field"], "text");
}

#[tokio::test]
async fn index_responses_are_cached_until_cleared() {
    let app = build_app(10, Some(Duration::from_secs(60)));
    let author = app.repos.seed_user("author");
    app.repos.seed_post(&author, None, "first");

    let (_, before) = get(&app, "/").await;

    // New content within the TTL window is not visible.
    app.repos.seed_post(&author, None, "second");
    let (_, cached) = get(&app, "/").await;
    assert_eq!(before, cached);

    // Clearing the cache forces a re-render.
    app.cache.as_ref().expect("cache").cache.clear().await;
    let (_, after) = get(&app, "/").await;
    assert_ne!(before, after);
    let body = json(&after);
    assert_eq!(body["posts"][0]["text"], "second");
}

#[tokio::test]
async fn personal_feed_requires_identity_and_filters_posts() {
    let app = build_app(10, None);
    let reader = app.repos.seed_user("reader");
    let followed = app.repos.seed_user("followed");
    let stranger = app.repos.seed_user("stranger");
    app.repos.seed_post(&followed, None, "wanted");
    app.repos.seed_post(&stranger, None, "unwanted");

    app.state
        .follows
        .follow(reader.id, "followed")
        .await
        .expect("follow");

    let (status, bytes) = get_as(&app, "/follow/", "reader").await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&bytes);
    let posts = body["posts"].as_array().expect("posts");
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["text"], "wanted");
}

#[tokio::test]
async fn unknown_posts_are_404() {
    let app = build_app(10, None);
    let (status, _) = get(
        &app,
        "/posts/00000000-0000-0000-0000-000000000000/",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
