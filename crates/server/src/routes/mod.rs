mod health;
mod pipelines;
mod tasks;
mod ws;

pub use health::*;
pub use pipelines::*;
pub use tasks::*;
pub use ws::*;
