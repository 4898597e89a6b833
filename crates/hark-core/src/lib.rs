pub mod command;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod model;
pub mod speech;
pub mod storage;
pub mod tools;

pub use command::{CommandService, SYSTEM_PROMPT};
pub use error::{CommandError, HarkError, ToolError};
