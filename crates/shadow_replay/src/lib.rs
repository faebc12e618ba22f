//! SHADOW.TEST Replay
//!
//! Loads baseline and capture sets, reconciles them under fixed policies,
//! and reports regressions, missing captures, and policy drift. Also offers
//! single-scenario verification that returns a typed regression.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod loader;
pub mod matcher;
pub mod replayer;
pub mod report;
pub mod verify;

pub use loader::{BaselineSet, CaptureSet};
pub use matcher::{
    replay, Matcher, MISSING_CAPTURE_HUMAN, MISSING_CAPTURE_SUMMARY, PASSED_SUMMARY,
    POLICY_DRIFT_PREFIX,
};
pub use replayer::Replayer;
pub use report::{CiReport, CiScenario, CiSummary, ReplayReport, ReplayScenarioResult, ReplayStatus};
pub use verify::{verify_against_baseline, verify_scenario, Regression, VerifyError};
