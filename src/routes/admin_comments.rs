/**
 * Admin Comment Routes
 * Moderation queue behind the manage_posts gate. Approval is the only way a
 * comment becomes publicly visible.
 */
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::{Comment, CommentStatus};
use crate::error::ApiError;
use crate::routes::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CommentListQuery {
    pub status: Option<CommentStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ModerateCommentRequest {
    pub status: CommentStatus,
}

/// Moderation-queue row: the comment plus enough context to judge it.
#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ModerationComment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub post_title: String,
    pub author_email: String,
    pub content: String,
    pub status: CommentStatus,
    pub created_at: DateTime<Utc>,
}

/// GET /api/admin/comments - Moderation queue, oldest first so the backlog
/// is worked in arrival order. Defaults to PENDING.
pub async fn list_comments(
    State(state): State<AppState>,
    Query(query): Query<CommentListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = state.pool()?;
    let status = query.status.unwrap_or(CommentStatus::Pending);

    let comments = sqlx::query_as::<_, ModerationComment>(
        r#"
        SELECT c.id, c.post_id, bp.title AS post_title, u.email AS author_email,
               c.content, c.status, c.created_at
        FROM comments c
        JOIN blog_posts bp ON bp.id = c.post_id
        JOIN users u ON u.id = c.author_id
        WHERE c.status = $1
        ORDER BY c.created_at ASC
        "#,
    )
    .bind(status)
    .fetch_all(pool)
    .await?;

    let count = comments.len();
    Ok(Json(ApiResponse::with_count(comments, count)))
}

/// PUT /api/admin/comments/{id} - Approve or reject a comment.
pub async fn moderate_comment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ModerateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = state.pool()?;

    let comment = sqlx::query_as::<_, Comment>(
        r#"
        UPDATE comments
        SET status = $1
        WHERE id = $2
        RETURNING id, post_id, author_id, content, status, created_at
        "#,
    )
    .bind(payload.status)
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(ApiError::NotFound("Comment"))?;

    tracing::info!(comment = %comment.id, status = ?comment.status, "comment moderated");

    Ok(Json(ApiResponse::new(comment)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::middleware;
    use axum::routing::{get, put};
    use axum::Router;
    use tower::ServiceExt;

    fn admin_router() -> Router {
        let state = AppState::detached();
        Router::new()
            .route("/api/admin/comments", get(list_comments))
            .route("/api/admin/comments/{id}", put(moderate_comment))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                authz::require_manage_posts,
            ))
            .with_state(state)
    }

    #[tokio::test]
    async fn test_queue_requires_token() {
        let res = admin_router()
            .oneshot(
                Request::get("/api/admin/comments")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_moderate_requires_token() {
        let res = admin_router()
            .oneshot(
                Request::put(format!("/api/admin/comments/{}", Uuid::new_v4()))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"status":"APPROVED"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
