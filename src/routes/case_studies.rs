/**
 * Case Study Routes (public)
 * Every case study is publicly visible; `featured` only affects ordering.
 */
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::db::models::CaseStudy;
use crate::error::ApiError;
use crate::routes::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CaseStudyListQuery {
    pub featured: Option<bool>,
}

/// GET /api/case-studies - Featured first, ties broken by recency.
pub async fn list_case_studies(
    State(state): State<AppState>,
    Query(query): Query<CaseStudyListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = state.pool()?;

    let case_studies = if query.featured == Some(true) {
        sqlx::query_as::<_, CaseStudy>(
            r#"
            SELECT id, title, slug, client, industry, challenge, solution, results,
                   technologies, featured, meta_title, meta_description,
                   created_at, updated_at
            FROM case_studies
            WHERE featured = true
            ORDER BY featured DESC, created_at DESC
            "#,
        )
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_as::<_, CaseStudy>(
            r#"
            SELECT id, title, slug, client, industry, challenge, solution, results,
                   technologies, featured, meta_title, meta_description,
                   created_at, updated_at
            FROM case_studies
            ORDER BY featured DESC, created_at DESC
            "#,
        )
        .fetch_all(pool)
        .await?
    };

    let count = case_studies.len();
    Ok(Json(ApiResponse::with_count(case_studies, count)))
}

/// GET /api/case-studies/{slug} - Single case study by slug.
pub async fn get_case_study(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = state.pool()?;

    let case_study = sqlx::query_as::<_, CaseStudy>(
        r#"
        SELECT id, title, slug, client, industry, challenge, solution, results,
               technologies, featured, meta_title, meta_description,
               created_at, updated_at
        FROM case_studies
        WHERE slug = $1
        "#,
    )
    .bind(&slug)
    .fetch_optional(pool)
    .await?
    .ok_or(ApiError::NotFound("Case study"))?;

    Ok(Json(ApiResponse::new(case_study)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn router() -> Router {
        Router::new()
            .route("/api/case-studies", get(list_case_studies))
            .route("/api/case-studies/{slug}", get(get_case_study))
            .with_state(AppState::detached())
    }

    #[tokio::test]
    async fn test_list_without_store_returns_service_unavailable() {
        let res = router()
            .oneshot(
                Request::get("/api/case-studies?featured=true")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_detail_without_store_returns_service_unavailable() {
        let res = router()
            .oneshot(
                Request::get("/api/case-studies/some-slug")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
