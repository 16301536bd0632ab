//! RAII guards that keep external state consistent when a run is cut short:
//!
//! - [`SessionGuard`] - Aborts an agent session that never reached a terminal event
//! - [`PhaseGuard`] - Closes a started phase's notification pair
//!
//! [`CancellationRegistry`] holds the per-run tokens a cancel trips.

mod cancellation;
mod phase_guard;
mod session_guard;

pub use cancellation::CancellationRegistry;
pub use phase_guard::PhaseGuard;
pub use session_guard::{LiveSession, SessionGuard, SessionRegistry};
