//! Simulated run scenarios.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SIM-001: Flat run with clean GPS
    SteadyRun,

    /// SIM-002: Rolling hills, elevation gain against ground truth
    HillRepeats,

    /// SIM-003: Degraded accuracy and a short receiver dropout
    GpsDropout,

    /// SIM-004: Pause mid-run while the runner stands still
    PauseResume,

    /// SIM-005: Fix stream lost and re-established mid-run
    SignalLoss,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SteadyRun,
            ScenarioId::HillRepeats,
            ScenarioId::GpsDropout,
            ScenarioId::PauseResume,
            ScenarioId::SignalLoss,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SteadyRun => "steady_run",
            ScenarioId::HillRepeats => "hill_repeats",
            ScenarioId::GpsDropout => "gps_dropout",
            ScenarioId::PauseResume => "pause_resume",
            ScenarioId::SignalLoss => "signal_loss",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::SteadyRun => "3 m/s on a gentle curve, 2 m correlated GPS noise",
            ScenarioId::HillRepeats => "10 m rolling hills, verify positive elevation gain",
            ScenarioId::GpsDropout => "45 m accuracy window plus 10% receiver dropout",
            ScenarioId::PauseResume => "Pause for the middle third, verify active time",
            ScenarioId::SignalLoss => "Stream lost for 20% of the run, gap not bridged",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "steady_run" | "steadyrun" | "sim-001" => Ok(ScenarioId::SteadyRun),
            "hill_repeats" | "hillrepeats" | "sim-002" => Ok(ScenarioId::HillRepeats),
            "gps_dropout" | "gpsdropout" | "sim-003" => Ok(ScenarioId::GpsDropout),
            "pause_resume" | "pauseresume" | "sim-004" => Ok(ScenarioId::PauseResume),
            "signal_loss" | "signalloss" | "sim-005" => Ok(ScenarioId::SignalLoss),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
