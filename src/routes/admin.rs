use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::dto::admin_dto::{
    CompanyPayload, CreateAccessCodePayload, CreateCoursePayload, CreateQuestionPayload,
    CreateSlidePayload, ListQuery, LoginRequest, LoginResponse, ReorderPayload,
    RevokeCertificatePayload, UpdateAccessCodePayload, UpdateCoursePayload, UpdateQuestionPayload,
    UpdateSlidePayload,
};
use crate::error::Result;
use crate::middleware::auth::Claims;
use crate::services::course_service::CourseFilter;
use crate::AppState;

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    let (token, expires_at) = state.auth_service.login(&req.email, &req.password).await?;
    tracing::info!(email = %req.email, "admin logged in");
    Ok(Json(LoginResponse { token, expires_at }))
}

// Companies

#[axum::debug_handler]
pub async fn list_companies(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(state.course_service.list_companies().await?))
}

#[axum::debug_handler]
pub async fn create_company(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CompanyPayload>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    let company = state.course_service.create_company(&req.name).await?;
    state
        .audit_service
        .record(Some(&claims.sub), "company_created", "company", company.id, Some(json!({ "name": company.name })))
        .await;
    Ok((StatusCode::CREATED, Json(company)))
}

#[axum::debug_handler]
pub async fn update_company(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<CompanyPayload>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    let company = state.course_service.update_company(id, &req.name).await?;
    state
        .audit_service
        .record(Some(&claims.sub), "company_updated", "company", id, Some(json!({ "name": company.name })))
        .await;
    Ok(Json(company))
}

#[axum::debug_handler]
pub async fn delete_company(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.course_service.delete_company(id).await?;
    state
        .audit_service
        .record(Some(&claims.sub), "company_deleted", "company", id, None)
        .await;
    Ok(StatusCode::NO_CONTENT)
}

// Courses

#[axum::debug_handler]
pub async fn list_courses(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let filter = CourseFilter {
        is_active: q.is_active,
        company_id: q.company_id,
        search: q.search.clone().filter(|s| !s.trim().is_empty()),
    };
    let page = state
        .course_service
        .list_courses(q.page(), q.per_page(), filter)
        .await?;
    Ok(Json(page))
}

#[axum::debug_handler]
pub async fn get_course(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.course_service.get_course(id).await?))
}

#[axum::debug_handler]
pub async fn create_course(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCoursePayload>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    let course = state.course_service.create_course(req).await?;
    state
        .audit_service
        .record(Some(&claims.sub), "course_created", "course", course.id, Some(json!({ "name": course.name })))
        .await;
    Ok((StatusCode::CREATED, Json(course)))
}

#[axum::debug_handler]
pub async fn update_course(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCoursePayload>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    let course = state.course_service.update_course(id, req).await?;
    state
        .audit_service
        .record(Some(&claims.sub), "course_updated", "course", id, Some(serde_json::to_value(&course)?))
        .await;
    Ok(Json(course))
}

#[axum::debug_handler]
pub async fn delete_course(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.course_service.delete_course(id).await?;
    state
        .audit_service
        .record(Some(&claims.sub), "course_deleted", "course", id, None)
        .await;
    Ok(StatusCode::NO_CONTENT)
}

// Theory slides

#[axum::debug_handler]
pub async fn list_slides(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.course_service.get_course(course_id).await?;
    Ok(Json(state.content_service.list_slides(course_id, false).await?))
}

#[axum::debug_handler]
pub async fn create_slide(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<CreateSlidePayload>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    state.course_service.get_course(course_id).await?;
    let slide = state.content_service.create_slide(course_id, req).await?;
    state
        .audit_service
        .record(Some(&claims.sub), "slide_created", "theory_slide", slide.id, None)
        .await;
    Ok((StatusCode::CREATED, Json(slide)))
}

#[axum::debug_handler]
pub async fn update_slide(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateSlidePayload>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    let slide = state.content_service.update_slide(id, req).await?;
    state
        .audit_service
        .record(Some(&claims.sub), "slide_updated", "theory_slide", id, None)
        .await;
    Ok(Json(slide))
}

#[axum::debug_handler]
pub async fn delete_slide(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.content_service.delete_slide(id).await?;
    state
        .audit_service
        .record(Some(&claims.sub), "slide_deleted", "theory_slide", id, None)
        .await;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn reorder_slides(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<ReorderPayload>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    let slides = state.content_service.reorder_slides(course_id, &req.ids).await?;
    state
        .audit_service
        .record(Some(&claims.sub), "slides_reordered", "course", course_id, Some(json!({ "ids": req.ids })))
        .await;
    Ok(Json(slides))
}

// Questions

#[axum::debug_handler]
pub async fn list_questions(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.course_service.get_course(course_id).await?;
    Ok(Json(state.content_service.list_questions(course_id, false).await?))
}

#[axum::debug_handler]
pub async fn get_question(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.content_service.get_question(id).await?))
}

#[axum::debug_handler]
pub async fn create_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<CreateQuestionPayload>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    state.course_service.get_course(course_id).await?;
    let question = state.content_service.create_question(course_id, req).await?;
    state
        .audit_service
        .record(Some(&claims.sub), "question_created", "test_question", question.id, None)
        .await;
    Ok((StatusCode::CREATED, Json(question)))
}

#[axum::debug_handler]
pub async fn update_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateQuestionPayload>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    let question = state.content_service.update_question(id, req).await?;
    state
        .audit_service
        .record(Some(&claims.sub), "question_updated", "test_question", id, None)
        .await;
    Ok(Json(question))
}

#[axum::debug_handler]
pub async fn delete_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.content_service.delete_question(id).await?;
    state
        .audit_service
        .record(Some(&claims.sub), "question_deleted", "test_question", id, None)
        .await;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn reorder_questions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<ReorderPayload>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    let questions = state.content_service.reorder_questions(course_id, &req.ids).await?;
    state
        .audit_service
        .record(Some(&claims.sub), "questions_reordered", "course", course_id, Some(json!({ "ids": req.ids })))
        .await;
    Ok(Json(questions))
}

// Access codes

#[axum::debug_handler]
pub async fn list_access_codes(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.access_code_service.list_codes(q.course_id).await?))
}

#[axum::debug_handler]
pub async fn create_access_code(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateAccessCodePayload>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    state.course_service.get_course(req.course_id).await?;
    let code = state.access_code_service.create_code(req).await?;
    state
        .audit_service
        .record(Some(&claims.sub), "access_code_created", "access_code", code.id, Some(json!({ "code": code.code })))
        .await;
    Ok((StatusCode::CREATED, Json(code)))
}

#[axum::debug_handler]
pub async fn update_access_code(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateAccessCodePayload>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    let code = state.access_code_service.update_code(id, req).await?;
    state
        .audit_service
        .record(Some(&claims.sub), "access_code_updated", "access_code", id, Some(serde_json::to_value(&code)?))
        .await;
    Ok(Json(code))
}

#[axum::debug_handler]
pub async fn delete_access_code(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.access_code_service.delete_code(id).await?;
    state
        .audit_service
        .record(Some(&claims.sub), "access_code_deleted", "access_code", id, None)
        .await;
    Ok(StatusCode::NO_CONTENT)
}

// Sessions and attempts

#[axum::debug_handler]
pub async fn list_course_sessions(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.course_service.get_course(course_id).await?;
    Ok(Json(state.session_service.list_sessions_for_course(course_id).await?))
}

#[axum::debug_handler]
pub async fn list_session_attempts(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let session = state.session_service.get_session(session_id).await?;
    let attempts = state.attempt_service.list_attempts(session_id).await?;
    Ok(Json(json!({ "session": session, "attempts": attempts })))
}

#[axum::debug_handler]
pub async fn get_attempt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.attempt_service.get_attempt_detail(id).await?))
}

// Certificates

#[axum::debug_handler]
pub async fn list_certificates(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let page = state
        .certificate_service
        .list_certificates(q.page(), q.per_page(), q.course_id, q.search.clone())
        .await?;
    Ok(Json(page))
}

#[axum::debug_handler]
pub async fn get_certificate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let details = state.certificate_service.get_details(id).await?;
    let jobs = state.delivery_service.list_jobs(id).await?;
    Ok(Json(json!({ "certificate": details, "deliveries": jobs })))
}

#[axum::debug_handler]
pub async fn revoke_certificate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<RevokeCertificatePayload>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    let certificate = state.certificate_service.revoke_certificate(id, &req.reason).await?;
    state
        .audit_service
        .record(Some(&claims.sub), "certificate_revoked", "certificate", id, Some(json!({ "reason": req.reason })))
        .await;
    Ok(Json(certificate))
}

#[axum::debug_handler]
pub async fn requeue_certificate_delivery(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let job = state.certificate_service.requeue_delivery(id).await?;
    state
        .audit_service
        .record(Some(&claims.sub), "certificate_delivery_requeued", "certificate", id, Some(json!({ "kind": job.kind })))
        .await;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

// Dashboard and audit

#[axum::debug_handler]
pub async fn dashboard_stats(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(state.stats_service.dashboard().await?))
}

#[axum::debug_handler]
pub async fn audit_trail(
    State(state): State<AppState>,
    Path(entity_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.audit_service.list_for_entity(entity_id).await?))
}
