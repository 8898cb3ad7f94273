/**
 * Admin Case Study Routes
 * CRUD behind the manage_resources gate. Case studies have no draft state;
 * a created row is immediately public.
 */
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::content;
use crate::db::models::CaseStudy;
use crate::error::{is_unique_violation, ApiError};
use crate::routes::{ApiResponse, MessageResponse};
use crate::state::AppState;

const DUPLICATE_TITLE: &str =
    "A case study with this title already exists. Please choose a different title.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCaseStudyRequest {
    pub title: String,
    pub client: String,
    pub industry: Option<String>,
    pub challenge: String,
    pub solution: String,
    pub results: String,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub featured: bool,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCaseStudyRequest {
    pub title: Option<String>,
    pub client: Option<String>,
    pub industry: Option<String>,
    pub challenge: Option<String>,
    pub solution: Option<String>,
    pub results: Option<String>,
    pub technologies: Option<Vec<String>>,
    pub featured: Option<bool>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

const CASE_STUDY_COLUMNS: &str = r#"
    id, title, slug, client, industry, challenge, solution, results,
    technologies, featured, meta_title, meta_description, created_at, updated_at
"#;

/// GET /api/admin/case-studies - All rows, most recently edited first.
pub async fn list_case_studies(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = state.pool()?;

    let case_studies = sqlx::query_as::<_, CaseStudy>(&format!(
        "SELECT {CASE_STUDY_COLUMNS} FROM case_studies ORDER BY updated_at DESC"
    ))
    .fetch_all(pool)
    .await?;

    let count = case_studies.len();
    Ok(Json(ApiResponse::with_count(case_studies, count)))
}

/// POST /api/admin/case-studies
pub async fn create_case_study(
    State(state): State<AppState>,
    Json(payload): Json<CreateCaseStudyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    for (value, field) in [
        (&payload.title, "title"),
        (&payload.client, "client"),
        (&payload.challenge, "challenge"),
        (&payload.solution, "solution"),
        (&payload.results, "results"),
    ] {
        if value.trim().is_empty() {
            return Err(ApiError::Validation(format!(
                "Missing required field: {field}"
            )));
        }
    }

    let slug = content::slugify(&payload.title);
    if slug.is_empty() {
        return Err(ApiError::Validation(
            "Title must contain at least one letter or digit".into(),
        ));
    }

    // metaTitle falls back to the title itself, as the original site did.
    let meta_title = payload
        .meta_title
        .clone()
        .unwrap_or_else(|| payload.title.trim().to_string());

    let pool = state.pool()?;

    let result = sqlx::query_as::<_, CaseStudy>(&format!(
        r#"
        INSERT INTO case_studies
            (title, slug, client, industry, challenge, solution, results,
             technologies, featured, meta_title, meta_description)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING {CASE_STUDY_COLUMNS}
        "#
    ))
    .bind(payload.title.trim())
    .bind(&slug)
    .bind(payload.client.trim())
    .bind(&payload.industry)
    .bind(&payload.challenge)
    .bind(&payload.solution)
    .bind(&payload.results)
    .bind(&payload.technologies)
    .bind(payload.featured)
    .bind(&meta_title)
    .bind(&payload.meta_description)
    .fetch_one(pool)
    .await;

    let case_study = result.map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::Duplicate(DUPLICATE_TITLE.to_string())
        } else {
            ApiError::from(e)
        }
    })?;

    tracing::info!(slug = %case_study.slug, "case study created");

    Ok((StatusCode::CREATED, Json(ApiResponse::new(case_study))))
}

/// PUT /api/admin/case-studies/{id} - Slug regenerates only when the title
/// changes.
pub async fn update_case_study(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCaseStudyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = state.pool()?;
    let mut tx = pool.begin().await?;

    let existing = sqlx::query_as::<_, CaseStudy>(&format!(
        "SELECT {CASE_STUDY_COLUMNS} FROM case_studies WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(ApiError::NotFound("Case study"))?;

    let title = payload.title.unwrap_or_else(|| existing.title.clone());
    if title.trim().is_empty() {
        return Err(ApiError::Validation("Title cannot be empty".into()));
    }
    let slug = content::slug_for_update(&existing.title, &existing.slug, &title);
    if slug.is_empty() {
        return Err(ApiError::Validation(
            "Title must contain at least one letter or digit".into(),
        ));
    }

    let client = payload.client.unwrap_or_else(|| existing.client.clone());
    let industry = payload.industry.or_else(|| existing.industry.clone());
    let challenge = payload
        .challenge
        .unwrap_or_else(|| existing.challenge.clone());
    let solution = payload.solution.unwrap_or_else(|| existing.solution.clone());
    let results = payload.results.unwrap_or_else(|| existing.results.clone());
    let technologies = payload
        .technologies
        .unwrap_or_else(|| existing.technologies.clone());
    let featured = payload.featured.unwrap_or(existing.featured);
    let meta_title = payload.meta_title.or_else(|| existing.meta_title.clone());
    let meta_description = payload
        .meta_description
        .or_else(|| existing.meta_description.clone());

    let result = sqlx::query_as::<_, CaseStudy>(&format!(
        r#"
        UPDATE case_studies
        SET title = $1, slug = $2, client = $3, industry = $4, challenge = $5,
            solution = $6, results = $7, technologies = $8, featured = $9,
            meta_title = $10, meta_description = $11, updated_at = now()
        WHERE id = $12
        RETURNING {CASE_STUDY_COLUMNS}
        "#
    ))
    .bind(title.trim())
    .bind(&slug)
    .bind(client.trim())
    .bind(&industry)
    .bind(&challenge)
    .bind(&solution)
    .bind(&results)
    .bind(&technologies)
    .bind(featured)
    .bind(&meta_title)
    .bind(&meta_description)
    .bind(id)
    .fetch_one(&mut *tx)
    .await;

    let case_study = result.map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::Duplicate(DUPLICATE_TITLE.to_string())
        } else {
            ApiError::from(e)
        }
    })?;

    tx.commit().await?;

    Ok(Json(ApiResponse::new(case_study)))
}

/// DELETE /api/admin/case-studies/{id}
pub async fn delete_case_study(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = state.pool()?;

    let result = sqlx::query("DELETE FROM case_studies WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Case study"));
    }

    Ok(Json(MessageResponse::new(
        "Case study deleted successfully",
    )))
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
            .route(
                "/api/admin/case-studies",
                get(list_case_studies).post(create_case_study),
            )
            .route(
                "/api/admin/case-studies/{id}",
                axum::routing::put(update_case_study).delete(delete_case_study),
            )
            .layer(middleware::from_fn_with_state(
                state.clone(),
                authz::require_manage_resources,
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
    async fn test_missing_token_rejected() {
        let res = admin_router()
            .oneshot(
                Request::get("/api/admin/case-studies")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_missing_required_field_rejected_before_store() {
        // No client/challenge/solution/results: 400 from validation, not 503.
        let req = Request::post("/api/admin/case-studies")
            .header("content-type", "application/json")
            .header("authorization", admin_bearer())
            .body(Body::from(
                r#"{"title":"Network Upgrade","client":"","challenge":"c","solution":"s","results":"r"}"#,
            ))
            .unwrap();
        let res = admin_router().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: crate::routes::ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(body.error.contains("client"));
    }
}
