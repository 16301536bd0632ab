pub mod executor_context;
pub mod message_parser;

pub use executor_context::{ExecutorConfig, ExecutorContext};
pub use message_parser::{MessageParser, ReviewVerdict};
