//! `job_type` string constants the worker dispatch table and recovery
//! reconciliation both key off of. Kept as plain `&str` constants (not an
//! enum) because the jobs table's `job_type` column is free text by design
//! — a new job type never requires a migration.

pub const PROCESS_PDF_CASE: &str = "process_pdf_case";
pub const POST_ROOM2_WIDGET: &str = "post_room2_widget";
pub const POST_ROOM3_REQUEST: &str = "post_room3_request";
pub const POST_ROOM1_FINAL_DENIAL_TRIAGE: &str = "post_room1_final_denial_triage";
pub const POST_ROOM1_FINAL_APPT: &str = "post_room1_final_appt";
pub const POST_ROOM1_FINAL_APPT_DENIED: &str = "post_room1_final_appt_denied";
pub const POST_ROOM1_FINAL_FAILURE: &str = "post_room1_final_failure";
pub const EXECUTE_CLEANUP: &str = "execute_cleanup";
