//! JSON exporter for finished simulated runs.
//!
//! Writes the stored record next to the ground truth it was measured
//! against, for plotting or for replaying into other tools.

use runtrack_core::RunRecord;
use runtrack_env::RoutePoint;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::runner::{ScenarioMetrics, ScenarioResult};
use crate::SimError;

/// Complete simulation export.
#[derive(Debug, Clone, Serialize)]
pub struct RunExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    pub metrics: ScenarioMetrics,

    /// True positions of the stored fixes, index-aligned with `record.route`
    pub truth_route: Vec<RoutePoint>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<RunRecord>,
}

impl RunExport {
    /// Creates an export from a finished scenario.
    pub fn from_result(result: &ScenarioResult) -> Self {
        Self {
            scenario: result.scenario.name().to_string(),
            seed: result.seed,
            duration_sec: result.final_time_secs,
            passed: result.passed,
            failure_reason: result.failure_reason.clone(),
            metrics: result.metrics.clone(),
            truth_route: result.truth_route.clone(),
            record: result.record.clone(),
        }
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ScenarioRunner;
    use crate::scenarios::ScenarioId;

    #[test]
    fn test_export_round_trips_record() {
        let result = ScenarioRunner::new(7).with_duration(30.0).run(ScenarioId::SteadyRun);
        let export = RunExport::from_result(&result);

        let path = std::env::temp_dir().join(format!("runtrack-export-{}.json", std::process::id()));
        export.write_to_file(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["scenario"], "steady_run");
        assert_eq!(json["seed"], 7);
        assert_eq!(json["truth_route"].as_array().unwrap().len(), 30);

        let record: RunRecord = serde_json::from_value(json["record"].clone()).unwrap();
        let original = result.record.unwrap();
        assert_eq!(record.id, original.id);
        assert_eq!(record.route.len(), original.route.len());
        assert_eq!(record.started_at_ms, original.started_at_ms);

        let _ = std::fs::remove_file(&path);
    }
}
