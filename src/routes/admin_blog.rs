/**
 * Admin Blog Routes
 * Full CRUD over posts, drafts included. Mounted behind the manage_posts
 * gate; handlers receive the verified claims from the middleware.
 */
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::authz::Claims;
use crate::content;
use crate::db::models::{BlogPost, BlogPostWithAuthor, PostStatus};
use crate::error::{is_unique_violation, ApiError};
use crate::routes::blog::{tags_for_posts, BlogPostResponse};
use crate::routes::{ApiResponse, MessageResponse};
use crate::state::AppState;

const DUPLICATE_TITLE: &str =
    "A blog post with this title already exists. Please choose a different title.";

// ============================================================================
// Request Types
// ============================================================================

fn default_status() -> PostStatus {
    PostStatus::Draft
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBlogPostRequest {
    pub title: String,
    pub content: String,
    pub excerpt: Option<String>,
    #[serde(default = "default_status")]
    pub status: PostStatus,
    #[serde(default)]
    pub featured: bool,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBlogPostRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub status: Option<PostStatus>,
    pub featured: Option<bool>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub tags: Option<Vec<String>>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/admin/blog - All posts including drafts, most recently edited
/// first.
pub async fn list_posts(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let pool = state.pool()?;

    let rows = sqlx::query_as::<_, BlogPostWithAuthor>(
        r#"
        SELECT bp.id, bp.title, bp.slug, bp.excerpt, bp.content, bp.status,
               bp.featured, bp.meta_title, bp.meta_description, bp.published_at,
               bp.author_id, bp.created_at, bp.updated_at,
               u.first_name AS author_first_name,
               u.last_name AS author_last_name,
               u.email AS author_email
        FROM blog_posts bp
        JOIN users u ON u.id = bp.author_id
        ORDER BY bp.updated_at DESC
        "#,
    )
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

/// POST /api/admin/blog - Create a post. Slug derives from the title; the
/// authenticated caller becomes the author.
pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateBlogPostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::Validation("Title is required".into()));
    }
    if payload.content.trim().is_empty() {
        return Err(ApiError::Validation("Content is required".into()));
    }

    let slug = content::slugify(&payload.title);
    if slug.is_empty() {
        return Err(ApiError::Validation(
            "Title must contain at least one letter or digit".into(),
        ));
    }

    let published_at = content::published_at_for_creation(payload.status);
    let author_id = claims.user_id()?;
    let pool = state.pool()?;

    // Single transaction: the slug's unique constraint is the race-breaker
    // for two concurrent creates with the same derived slug.
    let mut tx = pool.begin().await?;

    let result = sqlx::query_as::<_, BlogPost>(
        r#"
        INSERT INTO blog_posts
            (title, slug, excerpt, content, status, featured,
             meta_title, meta_description, published_at, author_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id, title, slug, excerpt, content, status, featured,
                  meta_title, meta_description, published_at, author_id,
                  created_at, updated_at
        "#,
    )
    .bind(payload.title.trim())
    .bind(&slug)
    .bind(&payload.excerpt)
    .bind(&payload.content)
    .bind(payload.status)
    .bind(payload.featured)
    .bind(&payload.meta_title)
    .bind(&payload.meta_description)
    .bind(published_at)
    .bind(author_id)
    .fetch_one(&mut *tx)
    .await;

    let post = result.map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::Duplicate(DUPLICATE_TITLE.to_string())
        } else {
            ApiError::from(e)
        }
    })?;

    replace_tags(&mut tx, post.id, &payload.tags).await?;
    tx.commit().await?;

    tracing::info!(slug = %post.slug, author = %claims.email, "blog post created");

    Ok((StatusCode::CREATED, Json(ApiResponse::new(post))))
}

/// PUT /api/admin/blog/{id} - Update a post. The slug regenerates only when
/// the title changes; publish transitions maintain `published_at`.
pub async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateBlogPostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if matches!(&payload.title, Some(t) if t.trim().is_empty()) {
        return Err(ApiError::Validation("Title cannot be empty".into()));
    }
    if matches!(&payload.content, Some(c) if c.trim().is_empty()) {
        return Err(ApiError::Validation("Content cannot be empty".into()));
    }

    let pool = state.pool()?;
    let mut tx = pool.begin().await?;

    let existing = sqlx::query_as::<_, BlogPost>(
        r#"
        SELECT id, title, slug, excerpt, content, status, featured,
               meta_title, meta_description, published_at, author_id,
               created_at, updated_at
        FROM blog_posts
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(ApiError::NotFound("Blog post"))?;

    let title = payload.title.unwrap_or_else(|| existing.title.clone());
    let slug = content::slug_for_update(&existing.title, &existing.slug, &title);
    if slug.is_empty() {
        return Err(ApiError::Validation(
            "Title must contain at least one letter or digit".into(),
        ));
    }

    let status = payload.status.unwrap_or(existing.status);
    let published_at =
        content::published_at_for_transition(existing.status, existing.published_at, status);

    let body = payload.content.unwrap_or_else(|| existing.content.clone());
    let excerpt = payload.excerpt.or_else(|| existing.excerpt.clone());
    let featured = payload.featured.unwrap_or(existing.featured);
    let meta_title = payload.meta_title.or_else(|| existing.meta_title.clone());
    let meta_description = payload
        .meta_description
        .or_else(|| existing.meta_description.clone());

    let result = sqlx::query_as::<_, BlogPost>(
        r#"
        UPDATE blog_posts
        SET title = $1, slug = $2, excerpt = $3, content = $4, status = $5,
            featured = $6, meta_title = $7, meta_description = $8,
            published_at = $9, updated_at = now()
        WHERE id = $10
        RETURNING id, title, slug, excerpt, content, status, featured,
                  meta_title, meta_description, published_at, author_id,
                  created_at, updated_at
        "#,
    )
    .bind(title.trim())
    .bind(&slug)
    .bind(&excerpt)
    .bind(&body)
    .bind(status)
    .bind(featured)
    .bind(&meta_title)
    .bind(&meta_description)
    .bind(published_at)
    .bind(id)
    .fetch_one(&mut *tx)
    .await;

    let post = result.map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::Duplicate(DUPLICATE_TITLE.to_string())
        } else {
            ApiError::from(e)
        }
    })?;

    if let Some(tags) = &payload.tags {
        replace_tags(&mut tx, post.id, tags).await?;
    }
    tx.commit().await?;

    Ok(Json(ApiResponse::new(post)))
}

/// DELETE /api/admin/blog/{id}
pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = state.pool()?;

    let result = sqlx::query("DELETE FROM blog_posts WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Blog post"));
    }

    Ok(Json(MessageResponse::new("Blog post deleted successfully")))
}

/// Replace the post's tag set. Tag rows are shared across posts and upserted
/// by name; only the join rows belong to this post.
async fn replace_tags(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    post_id: Uuid,
    tags: &[String],
) -> Result<(), ApiError> {
    sqlx::query("DELETE FROM blog_post_tags WHERE post_id = $1")
        .bind(post_id)
        .execute(&mut **tx)
        .await?;

    for tag in tags {
        let name = tag.trim();
        if name.is_empty() {
            continue;
        }
        let (tag_id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO tags (name)
            VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(name)
        .fetch_one(&mut **tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO blog_post_tags (post_id, tag_id)
            VALUES ($1, $2)
            ON CONFLICT (post_id, tag_id) DO NOTHING
            "#,
        )
        .bind(post_id)
        .bind(tag_id)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz;
    use axum::body::Body;
    use axum::http::Request;
    use axum::middleware;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn admin_router() -> Router {
        let state = AppState::detached();
        Router::new()
            .route("/api/admin/blog", get(list_posts).post(create_post))
            .route(
                "/api/admin/blog/{id}",
                axum::routing::put(update_post).delete(delete_post),
            )
            .layer(middleware::from_fn_with_state(
                state.clone(),
                authz::require_manage_posts,
            ))
            .with_state(state)
    }

    fn admin_bearer() -> String {
        let token = authz::create_access_token(
            Uuid::new_v4(),
            "admin@rippleworks.com",
            &["admin".to_string()],
        )
        .unwrap();
        format!("Bearer {token}")
    }

    #[tokio::test]
    async fn test_missing_token_rejected_before_any_handler() {
        let res = admin_router()
            .oneshot(Request::get("/api/admin/blog").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_garbage_token_rejected() {
        let res = admin_router()
            .oneshot(
                Request::get("/api/admin/blog")
                    .header("authorization", "Bearer not.a.token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_non_admin_permission_check_needs_store() {
        // A plain user is not short-circuited by the admin role; the
        // permission lookup hits the store, which is absent here.
        let token = authz::create_access_token(
            Uuid::new_v4(),
            "reader@example.com",
            &["user".to_string()],
        )
        .unwrap();
        let res = admin_router()
            .oneshot(
                Request::get("/api/admin/blog")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_create_empty_title_rejected_before_store() {
        let req = Request::post("/api/admin/blog")
            .header("content-type", "application/json")
            .header("authorization", admin_bearer())
            .body(Body::from(r#"{"title":"  ","content":"body"}"#))
            .unwrap();
        let res = admin_router().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_symbol_only_title_rejected() {
        // Slugifies to the empty string, which can never be a unique key.
        let req = Request::post("/api/admin/blog")
            .header("content-type", "application/json")
            .header("authorization", admin_bearer())
            .body(Body::from(r#"{"title":"!!!","content":"body"}"#))
            .unwrap();
        let res = admin_router().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
