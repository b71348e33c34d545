pub mod access_code;
pub mod admin_user;
pub mod audit_log;
pub mod certificate;
pub mod company;
pub mod course;
pub mod delivery_job;
pub mod question;
pub mod student_session;
pub mod test_attempt;
pub mod theory_slide;
