use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use validator::Validate;

use crate::dto::public_dto::{
    PublicCompanySummary, PublicCourseSummary, QuestionResultView, QuestionView,
    RedeemCodeRequest, RedeemCodeResponse, SessionProgressResponse, StartAttemptResponse,
    SubmitAttemptRequest, SubmitAttemptResponse, TheoryResponse, TheorySlideView,
    TheoryStatusResponse,
};
use crate::error::{Error, Result};
use crate::services::access_code_service::StudentIdentity;
use crate::AppState;

#[axum::debug_handler]
pub async fn redeem_code(
    State(state): State<AppState>,
    Json(req): Json<RedeemCodeRequest>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    let redemption = state
        .access_code_service
        .validate_and_redeem_code(
            &req.code,
            StudentIdentity {
                name: req.student_name,
                email: req.student_email,
            },
        )
        .await?;

    let status = if redemption.resumed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    let body = RedeemCodeResponse {
        access_token: redemption.session.access_token.clone(),
        session_id: redemption.session.id,
        student_name: redemption.session.student_name.clone(),
        resumed: redemption.resumed,
        requires_theory: redemption.access_code.requires_theory,
        course: PublicCourseSummary::from(&redemption.course),
        company: redemption.company.as_ref().map(PublicCompanySummary::from),
    };
    Ok((status, Json(body)))
}

#[axum::debug_handler]
pub async fn get_session(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse> {
    let ctx = state.session_service.context_by_token(&token).await?;
    let stats = state.session_service.attempt_stats(ctx.session.id).await?;
    let certificate = match state.certificate_service.get_for_session(ctx.session.id).await? {
        Some(c) => Some(state.certificate_service.to_public(&c)?),
        None => None,
    };

    Ok(Json(SessionProgressResponse {
        session_id: ctx.session.id,
        student_name: ctx.session.student_name.clone(),
        course: PublicCourseSummary::from(&ctx.course),
        requires_theory: ctx.access_code.requires_theory,
        theory_started_at: ctx.session.theory_started_at,
        theory_completed_at: ctx.session.theory_completed_at,
        attempts_used: stats.attempts_used,
        attempts_allowed: ctx.course.max_attempts,
        attempt_in_progress: stats.in_progress > 0,
        best_percentage: stats.best_percentage,
        passed: stats.passed,
        certificate,
    }))
}

#[axum::debug_handler]
pub async fn get_theory(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse> {
    let ctx = state.session_service.context_by_token(&token).await?;
    let slides = state.content_service.list_slides(ctx.course.id, true).await?;
    Ok(Json(TheoryResponse {
        slides: slides.iter().map(TheorySlideView::from).collect(),
        theory_started_at: ctx.session.theory_started_at,
        theory_completed_at: ctx.session.theory_completed_at,
    }))
}

#[axum::debug_handler]
pub async fn start_theory(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse> {
    let ctx = state.session_service.context_by_token(&token).await?;
    let session = state.session_service.start_theory(ctx.session.id).await?;
    Ok(Json(TheoryStatusResponse {
        theory_started_at: session.theory_started_at,
        theory_completed_at: session.theory_completed_at,
    }))
}

#[axum::debug_handler]
pub async fn complete_theory(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse> {
    let ctx = state.session_service.context_by_token(&token).await?;
    let session = state.session_service.complete_theory(ctx.session.id).await?;
    Ok(Json(TheoryStatusResponse {
        theory_started_at: session.theory_started_at,
        theory_completed_at: session.theory_completed_at,
    }))
}

#[axum::debug_handler]
pub async fn start_attempt(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse> {
    let ctx = state.session_service.context_by_token(&token).await?;
    let set = state.attempt_service.start_attempt(&ctx).await?;

    let status = if set.resumed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    let body = StartAttemptResponse {
        attempt_id: set.attempt.id,
        attempt_number: set.attempt.attempt_number,
        attempts_allowed: set.attempts_allowed,
        resumed: set.resumed,
        started_at: set.attempt.started_at,
        deadline: set.deadline,
        questions: set.questions.iter().map(QuestionView::from).collect(),
    };
    Ok((status, Json(body)))
}

#[axum::debug_handler]
pub async fn submit_attempt(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(req): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse> {
    let ctx = state.session_service.context_by_token(&token).await?;
    let result = state.attempt_service.submit_attempt(&ctx, req.answers).await?;
    let certificate = match &result.certificate {
        Some(c) => Some(state.certificate_service.to_public(c)?),
        None => None,
    };

    Ok(Json(SubmitAttemptResponse {
        attempt_id: result.attempt.id,
        attempt_number: result.attempt.attempt_number,
        score: result.outcome.score,
        max_score: result.outcome.max_score,
        percentage: result.outcome.percentage,
        passing_score: result.passing_score,
        passed: result.attempt.passed.unwrap_or(false),
        time_exceeded: result.attempt.time_exceeded,
        attempts_remaining: result.attempts_remaining,
        results: result
            .outcome
            .graded
            .into_iter()
            .map(QuestionResultView::from)
            .collect(),
        certificate,
    }))
}

#[axum::debug_handler]
pub async fn get_certificate(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse> {
    let ctx = state.session_service.context_by_token(&token).await?;
    let certificate = state
        .attempt_service
        .ensure_certificate(ctx.session.id)
        .await?
        .ok_or_else(|| Error::NotFound("No certificate has been issued for this session".into()))?;
    Ok(Json(state.certificate_service.to_public(&certificate)?))
}

#[axum::debug_handler]
pub async fn verify_certificate(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse> {
    let view = state.certificate_service.verify_certificate(&code).await?;
    tracing::info!(number = %view.certificate_number, valid = view.valid, "certificate verified");
    Ok(Json(view))
}
