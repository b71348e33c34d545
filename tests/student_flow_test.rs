mod common;

use chrono::{Duration, Utc};
use training_backend::dto::admin_dto::{
    CreateAccessCodePayload, CreateCoursePayload, CreateQuestionPayload,
};
use training_backend::error::Error;
use training_backend::models::access_code::AccessCode;
use training_backend::models::certificate::Certificate;
use training_backend::models::course::Course;
use training_backend::models::delivery_job::{KIND_RENDER_DOCUMENT, KIND_SEND_EMAIL};
use training_backend::models::question::{AnswerValue, QuestionType};
use training_backend::models::test_attempt::AnswerSheet;
use training_backend::services::access_code_service::StudentIdentity;
use training_backend::services::attempt_service::QuestionSet;
use training_backend::services::delivery_service::{STATUS_FAILED, STATUS_PENDING, STATUS_SUCCESS};
use training_backend::services::session_service::SessionContext;
use training_backend::AppState;
use uuid::Uuid;

async fn seed_course(state: &AppState, max_attempts: i32, questions: usize) -> Course {
    let course = state
        .course_service
        .create_course(CreateCoursePayload {
            company_id: None,
            name: format!("Forklift Safety {}", Uuid::new_v4()),
            description: Some("Warehouse induction".into()),
            passing_score: 80,
            time_limit_minutes: Some(30),
            max_attempts: Some(max_attempts),
            max_questions_in_test: None,
            is_active: Some(true),
        })
        .await
        .expect("course");

    for i in 0..questions {
        state
            .content_service
            .create_question(
                course.id,
                CreateQuestionPayload {
                    question_text: format!("Question {}", i + 1),
                    question_type: QuestionType::SingleChoice,
                    options: vec!["A".into(), "B".into(), "C".into()],
                    correct_answers: AnswerValue::Single("A".into()),
                    points: Some(1),
                    is_active: None,
                },
            )
            .await
            .expect("question");
    }
    course
}

async fn seed_code(
    state: &AppState,
    course: &Course,
    max_participants: Option<i32>,
    requires_theory: bool,
    valid_for: Duration,
) -> AccessCode {
    state
        .access_code_service
        .create_code(CreateAccessCodePayload {
            code: None,
            course_id: course.id,
            company_id: None,
            valid_until: Utc::now() + valid_for,
            max_participants,
            unlimited_participants: max_participants.is_none(),
            requires_theory: Some(requires_theory),
            is_active: Some(true),
        })
        .await
        .expect("access code")
}

fn student(tag: &str) -> StudentIdentity {
    StudentIdentity {
        name: format!("Student {}", tag),
        email: format!("{}-{}@example.com", tag, Uuid::new_v4()),
    }
}

async fn open_session(state: &AppState, max_attempts: i32, questions: usize) -> SessionContext {
    let course = seed_course(state, max_attempts, questions).await;
    let code = seed_code(state, &course, None, false, Duration::days(1)).await;
    let redemption = state
        .access_code_service
        .validate_and_redeem_code(&code.code, student("s"))
        .await
        .unwrap();
    state
        .session_service
        .context_by_token(&redemption.session.access_token)
        .await
        .unwrap()
}

async fn certified_session(state: &AppState) -> Certificate {
    let ctx = open_session(state, 1, 1).await;
    let set = state.attempt_service.start_attempt(&ctx).await.unwrap();
    let result = state
        .attempt_service
        .submit_attempt(&ctx, answers(&set, 1))
        .await
        .unwrap();
    result.certificate.expect("certificate")
}

/// Answers the first `correct` questions right and the rest wrong.
fn answers(set: &QuestionSet, correct: usize) -> AnswerSheet {
    set.questions
        .iter()
        .enumerate()
        .map(|(i, q)| {
            let pick = if i < correct { "A" } else { "B" };
            (q.id, AnswerValue::Single(pick.into()))
        })
        .collect()
}

#[tokio::test]
async fn full_flow_from_redeem_to_verified_certificate() {
    let Some(state) = common::database_state().await else {
        return;
    };
    let course = seed_course(&state, 3, 5).await;
    let code = seed_code(&state, &course, Some(5), true, Duration::days(1)).await;

    let redemption = state
        .access_code_service
        .validate_and_redeem_code(&code.code.to_lowercase(), student("flow"))
        .await
        .expect("redeem");
    assert!(!redemption.resumed);
    let token = redemption.session.access_token.clone();

    let ctx = state.session_service.context_by_token(&token).await.unwrap();
    let err = state.attempt_service.start_attempt(&ctx).await.unwrap_err();
    assert!(matches!(err, Error::TheoryNotCompleted));

    state.session_service.complete_theory(ctx.session.id).await.unwrap();
    let ctx = state.session_service.context_by_token(&token).await.unwrap();
    assert!(ctx.session.theory_started_at.is_some());

    let first = state.attempt_service.start_attempt(&ctx).await.unwrap();
    assert_eq!(first.attempt.attempt_number, 1);
    assert_eq!(first.questions.len(), 5);
    assert!(first.deadline.is_some());

    let again = state.attempt_service.start_attempt(&ctx).await.unwrap();
    assert!(again.resumed);
    assert_eq!(again.attempt.id, first.attempt.id);

    let failed = state
        .attempt_service
        .submit_attempt(&ctx, answers(&first, 3))
        .await
        .unwrap();
    assert_eq!(failed.outcome.percentage, 60);
    assert_eq!(failed.attempt.passed, Some(false));
    assert_eq!(failed.attempts_remaining, 2);
    assert!(failed.certificate.is_none());

    let second = state.attempt_service.start_attempt(&ctx).await.unwrap();
    assert_eq!(second.attempt.attempt_number, 2);
    let passed = state
        .attempt_service
        .submit_attempt(&ctx, answers(&second, 4))
        .await
        .unwrap();
    assert_eq!(passed.outcome.percentage, 80);
    assert_eq!(passed.attempt.passed, Some(true));
    let certificate = passed.certificate.expect("certificate issued");
    assert!(certificate.certificate_number.starts_with("CERT-"));
    assert_eq!(certificate.verification_code.len(), 12);

    let err = state.attempt_service.start_attempt(&ctx).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyCertified));
    let err = state
        .certificate_service
        .issue_certificate_if_passed(&passed.attempt)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyCertified));

    // A worker in a parallel test may already have moved past the render step.
    let jobs = state.delivery_service.list_jobs(certificate.id).await.unwrap();
    assert_eq!(jobs[0].kind, KIND_RENDER_DOCUMENT);

    let view = state
        .certificate_service
        .verify_certificate(&certificate.verification_code.to_lowercase())
        .await
        .unwrap();
    assert!(view.valid);
    assert_eq!(view.course_name, course.name);

    state
        .certificate_service
        .revoke_certificate(certificate.id, "Issued in error")
        .await
        .unwrap();
    let view = state
        .certificate_service
        .verify_certificate(&certificate.verification_code)
        .await
        .unwrap();
    assert!(!view.valid);
    assert!(view.revoked_at.is_some());
}

#[tokio::test]
async fn capacity_is_enforced_and_returning_students_resume() {
    let Some(state) = common::database_state().await else {
        return;
    };
    let course = seed_course(&state, 1, 2).await;
    let code = seed_code(&state, &course, Some(1), false, Duration::days(1)).await;

    let dana = student("dana");
    let first = state
        .access_code_service
        .validate_and_redeem_code(&code.code, dana.clone())
        .await
        .unwrap();
    let again = state
        .access_code_service
        .validate_and_redeem_code(&code.code, StudentIdentity {
            name: dana.name.clone(),
            email: dana.email.to_uppercase(),
        })
        .await
        .unwrap();
    assert!(again.resumed);
    assert_eq!(again.session.id, first.session.id);

    let err = state
        .access_code_service
        .validate_and_redeem_code(&code.code, student("late"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CapacityExceeded));

    let stored = state.access_code_service.get_by_id(code.id).await.unwrap();
    assert_eq!(stored.usage_count, 1);
}

#[tokio::test]
async fn concurrent_redemptions_never_overfill_a_code() {
    let Some(state) = common::database_state().await else {
        return;
    };
    let course = seed_course(&state, 1, 1).await;
    let code = seed_code(&state, &course, Some(3), false, Duration::days(1)).await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let svc = state.access_code_service.clone();
        let value = code.code.clone();
        handles.push(tokio::spawn(async move {
            svc.validate_and_redeem_code(&value, student(&format!("rush{}", i)))
                .await
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(Error::CapacityExceeded) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(admitted, 3);
    let stored = state.access_code_service.get_by_id(code.id).await.unwrap();
    assert_eq!(stored.usage_count, 3);
}

#[tokio::test]
async fn expired_and_inactive_codes_are_rejected() {
    let Some(state) = common::database_state().await else {
        return;
    };
    let course = seed_course(&state, 1, 1).await;

    let expired = seed_code(&state, &course, None, false, Duration::hours(-1)).await;
    let err = state
        .access_code_service
        .validate_and_redeem_code(&expired.code, student("exp"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CodeExpired));

    let inactive = seed_code(&state, &course, None, false, Duration::days(1)).await;
    state
        .access_code_service
        .update_code(
            inactive.id,
            training_backend::dto::admin_dto::UpdateAccessCodePayload {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let err = state
        .access_code_service
        .validate_and_redeem_code(&inactive.code, student("off"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CodeInactive));

    let err = state
        .access_code_service
        .validate_and_redeem_code("NOSUCHCODE", student("none"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn attempts_are_capped_per_session() {
    let Some(state) = common::database_state().await else {
        return;
    };
    let course = seed_course(&state, 1, 2).await;
    let code = seed_code(&state, &course, None, false, Duration::days(1)).await;
    let redemption = state
        .access_code_service
        .validate_and_redeem_code(&code.code, student("cap"))
        .await
        .unwrap();
    let ctx = state
        .session_service
        .context_by_token(&redemption.session.access_token)
        .await
        .unwrap();

    let set = state.attempt_service.start_attempt(&ctx).await.unwrap();
    let result = state
        .attempt_service
        .submit_attempt(&ctx, answers(&set, 0))
        .await
        .unwrap();
    assert_eq!(result.attempts_remaining, 0);

    let err = state.attempt_service.start_attempt(&ctx).await.unwrap_err();
    assert!(matches!(err, Error::AttemptLimitExceeded(1)));
    let attempts = state.attempt_service.list_attempts(ctx.session.id).await.unwrap();
    assert_eq!(attempts.len(), 1);

    let err = state
        .attempt_service
        .submit_attempt(&ctx, AnswerSheet::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn late_submissions_are_flagged_and_fail() {
    let Some(state) = common::database_state().await else {
        return;
    };
    let course = seed_course(&state, 2, 2).await;
    let code = seed_code(&state, &course, None, false, Duration::days(1)).await;
    let redemption = state
        .access_code_service
        .validate_and_redeem_code(&code.code, student("late"))
        .await
        .unwrap();
    let ctx = state
        .session_service
        .context_by_token(&redemption.session.access_token)
        .await
        .unwrap();

    let set = state.attempt_service.start_attempt(&ctx).await.unwrap();
    sqlx::query("UPDATE test_attempts SET started_at = NOW() - INTERVAL '2 hours' WHERE id = $1")
        .bind(set.attempt.id)
        .execute(&state.pool)
        .await
        .unwrap();

    let result = state
        .attempt_service
        .submit_attempt(&ctx, answers(&set, 2))
        .await
        .unwrap();
    assert_eq!(result.outcome.percentage, 100);
    assert!(result.attempt.time_exceeded);
    assert_eq!(result.attempt.passed, Some(false));
    assert!(result.certificate.is_none());
}

#[tokio::test]
async fn reorder_rejects_foreign_ids() {
    let Some(state) = common::database_state().await else {
        return;
    };
    let course = seed_course(&state, 1, 3).await;
    let questions = state.content_service.list_questions(course.id, false).await.unwrap();
    let mut ids: Vec<Uuid> = questions.iter().map(|q| q.id).collect();
    ids.reverse();

    let reordered = state
        .content_service
        .reorder_questions(course.id, &ids)
        .await
        .unwrap();
    assert_eq!(reordered.iter().map(|q| q.id).collect::<Vec<_>>(), ids);
    assert_eq!(reordered[0].question_order, 1);

    ids[0] = Uuid::new_v4();
    let err = state
        .content_service
        .reorder_questions(course.id, &ids)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[tokio::test]
async fn concurrent_starts_share_one_attempt() {
    let Some(state) = common::database_state().await else {
        return;
    };

    for _ in 0..5 {
        let ctx = open_session(&state, 5, 3).await;
        let mut handles = Vec::new();
        for _ in 0..6 {
            let svc = state.attempt_service.clone();
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move { svc.start_attempt(&ctx).await }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            let set = handle.await.unwrap().expect("start or resume");
            ids.push(set.attempt.id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1, "every caller gets the same attempt");

        let open: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM test_attempts WHERE student_session_id = $1 AND status = 'in_progress'",
        )
        .bind(ctx.session.id)
        .fetch_one(&state.pool)
        .await
        .unwrap();
        assert_eq!(open, 1);
        let attempts = state.attempt_service.list_attempts(ctx.session.id).await.unwrap();
        assert_eq!(attempts.len(), 1);
    }
}

#[tokio::test]
async fn delivered_jobs_end_in_success() {
    let Some(state) = common::database_state().await else {
        return;
    };
    let certificate = certified_session(&state).await;

    let mut delivered = false;
    for _ in 0..200 {
        let jobs = state.delivery_service.list_jobs(certificate.id).await.unwrap();
        if jobs.len() == 2 && jobs.iter().all(|j| j.status == STATUS_SUCCESS) {
            delivered = true;
            break;
        }
        if !state.delivery_service.run_once().await.unwrap() {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }
    assert!(delivered, "render and email jobs should both succeed");

    let jobs = state.delivery_service.list_jobs(certificate.id).await.unwrap();
    assert_eq!(jobs[0].kind, KIND_RENDER_DOCUMENT);
    assert_eq!(jobs[1].kind, KIND_SEND_EMAIL);
}

#[tokio::test]
async fn stale_processing_jobs_count_as_attempts() {
    let Some(state) = common::database_state().await else {
        return;
    };
    let certificate = certified_session(&state).await;

    let insert_stale = |attempts: i32| {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO delivery_jobs (certificate_id, kind, status, attempts, max_attempts, updated_at)
            VALUES ($1, 'send_email', 'processing', $2, 3, NOW() - INTERVAL '1 hour')
            RETURNING id
            "#,
        )
        .bind(certificate.id)
        .bind(attempts)
        .fetch_one(&state.pool)
    };
    let exhausted_id = insert_stale(2).await.unwrap();
    let retried_id = insert_stale(0).await.unwrap();

    state.delivery_service.reclaim_stale().await.unwrap();

    let jobs = state.delivery_service.list_jobs(certificate.id).await.unwrap();
    let exhausted = jobs.iter().find(|j| j.id == exhausted_id).unwrap();
    assert_eq!(exhausted.status, STATUS_FAILED);
    assert_eq!(exhausted.attempts, 3);
    assert!(exhausted.next_retry_at.is_none());

    let retried = jobs.iter().find(|j| j.id == retried_id).unwrap();
    assert_eq!(retried.status, STATUS_PENDING);
    assert_eq!(retried.attempts, 1);
    assert!(retried.next_retry_at.unwrap() > Utc::now());
    assert!(retried.last_error.is_some());
}
