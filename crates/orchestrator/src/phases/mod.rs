//! Phase implementations for the orchestrator.
//!
//! - [`AnalysisPhase`] - Agent analyses the task; output becomes `analysis`
//! - [`DevelopmentPhase`] - Agent implements the analysed stories
//! - [`JudgePhase`] - Agent reviews the work, with fix rounds on rejection
//! - [`MergePhase`] - Opens a pull request and merges it after approval

mod analysis;
mod development;
mod judge;
mod merge;

pub use analysis::AnalysisPhase;
pub use development::DevelopmentPhase;
pub use judge::JudgePhase;
pub use merge::MergePhase;
