pub mod access_code_service;
pub mod attempt_service;
pub mod audit_service;
pub mod auth_service;
pub mod certificate_service;
pub mod content_service;
pub mod course_service;
pub mod delivery_service;
pub mod grading_service;
pub mod session_service;
pub mod stats_service;
