pub mod provider;
pub mod providers;

pub use provider::{LlmError, LlmProvider, Message, Role, SharedLlmProvider};
pub use providers::create_provider;
