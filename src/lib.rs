pub mod cache;
pub mod config;
pub mod error;
pub mod preprocess;
pub mod rewrite;
pub mod session;
pub mod translator;
pub mod validator;

pub use error::{AssistantError, Result};
pub use session::{AnswerResult, QueryPipeline, RepairSession, SessionStatus};
