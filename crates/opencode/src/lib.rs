pub mod client;
pub mod error;
pub mod events;
pub mod traits;
pub mod types;

pub use client::OpenCodeClient;
pub use error::{OpenCodeError, Result};
pub use events::{EventSubscription, SessionEvent, SessionEventKind};
pub use traits::AgentSessions;
pub use types::*;
