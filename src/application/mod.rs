pub mod submit;
pub mod types;

pub use submit::{PipelinePolicy, SubmitError, SubmitUseCase};
pub use types::{ApiResponse, ResponseCode, ResponseData, SubmitRequest};
