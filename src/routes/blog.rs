/**
 * Blog Routes (public)
 * Published posts only; approved comments only, oldest first.
 */
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authz;
use crate::db::models::{BlogPostWithAuthor, Comment, CommentWithAuthor, PostStatus};
use crate::error::ApiError;
use crate::routes::ApiResponse;
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorSummary {
    pub id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPostResponse {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub status: PostStatus,
    pub featured: bool,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: AuthorSummary,
    pub tags: Vec<String>,
}

impl BlogPostResponse {
    pub fn from_row(row: BlogPostWithAuthor, tags: Vec<String>) -> Self {
        Self {
            id: row.id,
            title: row.title,
            slug: row.slug,
            excerpt: row.excerpt,
            content: row.content,
            status: row.status,
            featured: row.featured,
            meta_title: row.meta_title,
            meta_description: row.meta_description,
            published_at: row.published_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            author: AuthorSummary {
                id: row.author_id,
                first_name: row.author_first_name,
                last_name: row.author_last_name,
                email: row.author_email,
            },
            tags,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub author_name: String,
}

impl From<CommentWithAuthor> for CommentResponse {
    fn from(row: CommentWithAuthor) -> Self {
        let author_name = display_name(
            row.author_first_name.as_deref(),
            row.author_last_name.as_deref(),
        );
        Self {
            id: row.id,
            content: row.content,
            created_at: row.created_at,
            author_name,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPostDetailResponse {
    #[serde(flatten)]
    pub post: BlogPostResponse,
    pub comments: Vec<CommentResponse>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
}

fn display_name(first: Option<&str>, last: Option<&str>) -> String {
    match (first, last) {
        (Some(f), Some(l)) => format!("{f} {l}"),
        (Some(f), None) => f.to_string(),
        (None, Some(l)) => l.to_string(),
        (None, None) => "Anonymous".to_string(),
    }
}

// ============================================================================
// Queries shared with the detail view
// ============================================================================

const POST_WITH_AUTHOR_COLUMNS: &str = r#"
    bp.id, bp.title, bp.slug, bp.excerpt, bp.content, bp.status, bp.featured,
    bp.meta_title, bp.meta_description, bp.published_at, bp.author_id,
    bp.created_at, bp.updated_at,
    u.first_name AS author_first_name,
    u.last_name AS author_last_name,
    u.email AS author_email
"#;

pub(crate) async fn tags_for_posts(
    pool: &sqlx::PgPool,
    post_ids: &[Uuid],
) -> Result<std::collections::HashMap<Uuid, Vec<String>>, ApiError> {
    let rows: Vec<(Uuid, String)> = sqlx::query_as(
        r#"
        SELECT bpt.post_id, t.name
        FROM blog_post_tags bpt
        JOIN tags t ON t.id = bpt.tag_id
        WHERE bpt.post_id = ANY($1)
        ORDER BY t.name
        "#,
    )
    .bind(post_ids)
    .fetch_all(pool)
    .await?;

    let mut by_post: std::collections::HashMap<Uuid, Vec<String>> = Default::default();
    for (post_id, name) in rows {
        by_post.entry(post_id).or_default().push(name);
    }
    Ok(by_post)
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/blog - All published posts, newest publication first.
pub async fn list_posts(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let pool = state.pool()?;

    let rows = sqlx::query_as::<_, BlogPostWithAuthor>(&format!(
        r#"
        SELECT {POST_WITH_AUTHOR_COLUMNS}
        FROM blog_posts bp
        JOIN users u ON u.id = bp.author_id
        WHERE bp.status = 'PUBLISHED'
        ORDER BY bp.published_at DESC
        "#
    ))
    .fetch_all(pool)
    .await?;

    let post_ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let mut tags = tags_for_posts(pool, &post_ids).await?;

    let posts: Vec<BlogPostResponse> = rows
        .into_iter()
        .map(|row| {
            let post_tags = tags.remove(&row.id).unwrap_or_default();
            BlogPostResponse::from_row(row, post_tags)
        })
        .collect();

    let count = posts.len();
    Ok(Json(ApiResponse::with_count(posts, count)))
}

/// GET /api/blog/{slug} - Single published post with approved comments,
/// oldest first.
pub async fn get_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = state.pool()?;

    let row = sqlx::query_as::<_, BlogPostWithAuthor>(&format!(
        r#"
        SELECT {POST_WITH_AUTHOR_COLUMNS}
        FROM blog_posts bp
        JOIN users u ON u.id = bp.author_id
        WHERE bp.slug = $1 AND bp.status = 'PUBLISHED'
        "#
    ))
    .bind(&slug)
    .fetch_optional(pool)
    .await?
    .ok_or(ApiError::NotFound("Blog post"))?;

    let mut tags = tags_for_posts(pool, &[row.id]).await?;
    let post_tags = tags.remove(&row.id).unwrap_or_default();

    let comments = sqlx::query_as::<_, CommentWithAuthor>(
        r#"
        SELECT c.id, c.post_id, c.author_id, c.content, c.status, c.created_at,
               u.first_name AS author_first_name,
               u.last_name AS author_last_name
        FROM comments c
        JOIN users u ON u.id = c.author_id
        WHERE c.post_id = $1 AND c.status = 'APPROVED'
        ORDER BY c.created_at ASC
        "#,
    )
    .bind(row.id)
    .fetch_all(pool)
    .await?;

    let detail = BlogPostDetailResponse {
        post: BlogPostResponse::from_row(row, post_tags),
        comments: comments.into_iter().map(CommentResponse::from).collect(),
    };

    Ok(Json(ApiResponse::new(detail)))
}

/// POST /api/blog/{slug}/comments - Leave a comment on a published post.
/// Requires a logged-in user; the comment starts PENDING and is invisible
/// to public readers until approved.
pub async fn create_comment(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = authz::authenticate(&headers)?;

    if payload.content.trim().is_empty() {
        return Err(ApiError::Validation("Comment content is required".into()));
    }

    let pool = state.pool()?;

    let post_id: Uuid = sqlx::query_as::<_, (Uuid,)>(
        "SELECT id FROM blog_posts WHERE slug = $1 AND status = 'PUBLISHED'",
    )
    .bind(&slug)
    .fetch_optional(pool)
    .await?
    .ok_or(ApiError::NotFound("Blog post"))?
    .0;

    let comment = sqlx::query_as::<_, Comment>(
        r#"
        INSERT INTO comments (post_id, author_id, content)
        VALUES ($1, $2, $3)
        RETURNING id, post_id, author_id, content, status, created_at
        "#,
    )
    .bind(post_id)
    .bind(claims.user_id()?)
    .bind(payload.content.trim())
    .fetch_one(pool)
    .await?;

    tracing::info!(post = %slug, user = %claims.email, "comment submitted for moderation");

    Ok((StatusCode::CREATED, Json(ApiResponse::new(comment))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::ErrorResponse;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, post};
    use axum::Router;
    use tower::ServiceExt;

    fn blog_router() -> Router {
        Router::new()
            .route("/api/blog", get(list_posts))
            .route("/api/blog/{slug}", get(get_post))
            .route("/api/blog/{slug}/comments", post(create_comment))
            .with_state(AppState::detached())
    }

    fn bearer_for_test_user() -> String {
        let token = authz::create_access_token(
            Uuid::new_v4(),
            "reader@example.com",
            &["user".to_string()],
        )
        .unwrap();
        format!("Bearer {token}")
    }

    #[tokio::test]
    async fn test_list_without_store_returns_service_unavailable() {
        let res = blog_router()
            .oneshot(Request::get("/api/blog").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_comment_without_token_returns_unauthorized() {
        let req = Request::post("/api/blog/some-post/comments")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"content":"hello"}"#))
            .unwrap();
        let res = blog_router().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_comment_empty_content_rejected_before_store() {
        // Valid token + empty body: fails validation (400), not 503 — the
        // check runs before any store access.
        let req = Request::post("/api/blog/some-post/comments")
            .header("content-type", "application/json")
            .header("authorization", bearer_for_test_user())
            .body(Body::from(r#"{"content":"   "}"#))
            .unwrap();
        let res = blog_router().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(!body.success);
        assert!(body.error.contains("required"));
    }
}
