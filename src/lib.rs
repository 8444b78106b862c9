pub mod application;
pub mod domain;
pub mod handlers;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{ApiResponse, PipelinePolicy, ResponseCode, SubmitRequest, SubmitUseCase};
pub use domain::{Submission, SubmissionReceipt, ValidationRules};
pub use infrastructure::ledger::{Ledger, SqliteLedger};
