use serde::Serialize;
use std::sync::Arc;

use crate::core::Phase;
use crate::phases::{AnalysisPhase, DevelopmentPhase, JudgePhase, MergePhase};

/// Named, ordered, immutable list of phases.
#[derive(Clone)]
pub struct Pipeline {
    name: String,
    description: String,
    phases: Vec<Arc<dyn Phase>>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            phases: Vec::new(),
        }
    }

    pub fn with_phase<P: Phase + 'static>(mut self, phase: P) -> Self {
        self.phases.push(Arc::new(phase));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn phases(&self) -> &[Arc<dyn Phase>] {
        &self.phases
    }

    pub fn phase_names(&self) -> Vec<String> {
        self.phases.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn info(&self) -> PipelineInfo {
        PipelineInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            phases: self.phase_names(),
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("phases", &self.phase_names())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineInfo {
    pub name: String,
    pub description: String,
    pub phases: Vec<String>,
}

/// Pipelines registered by the binary at startup
pub fn standard_pipelines() -> Vec<Pipeline> {
    vec![
        Pipeline::new("full", "Analyse, implement, judge and merge a task")
            .with_phase(AnalysisPhase)
            .with_phase(DevelopmentPhase)
            .with_phase(JudgePhase)
            .with_phase(MergePhase),
        Pipeline::new("implement", "Implement, judge and merge without a separate analysis")
            .with_phase(DevelopmentPhase)
            .with_phase(JudgePhase)
            .with_phase(MergePhase),
        Pipeline::new("ship", "Open and merge a pull request for work already on the branch")
            .with_phase(MergePhase),
    ]
}
