use serde::Serialize;

/// Timing of one completed stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageMetrics {
    pub index: usize,
    pub name: &'static str,
    pub duration_ms: u128,
}

/// Timing of a whole bring-up run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineMetrics {
    pub total_duration_ms: u128,
    pub stages: Vec<StageMetrics>,
}

impl PipelineMetrics {
    pub fn stage_duration_ms(&self, name: &str) -> Option<u128> {
        self.stages
            .iter()
            .find(|stage| stage.name == name)
            .map(|stage| stage.duration_ms)
    }

    pub fn completed_stages(&self) -> usize {
        self.stages.len()
    }
}
