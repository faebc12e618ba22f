//! SHADOW.TEST Governance
//!
//! Baseline records and their on-disk store, the governance transition
//! table, and the state machine that approves and deprecates baselines with
//! an append-only audit history.
//!
//! Lifecycle:
//! - `pending` becomes `approved` on first approval;
//! - `approved` may be re-approved (new version) or deprecated;
//! - `deprecated` may be reactivated by approval.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod governor;
pub mod policy;
pub mod record;
pub mod store;

pub use governor::{
    decision_id, evaluate_decision, Decision, Governor, TransitionValidator,
    CUSTOM_TRANSITION_ALLOWED, CUSTOM_TRANSITION_DENIED, STRICT_GOVERNANCE_DISABLED,
};
pub use policy::{GovernanceAction, GovernancePolicy, Transition, DEFAULT_GOVERNANCE_POLICY_ID};
pub use record::{
    identity_from_file_name, migrate_for_version, new_version_id, ApprovalAction, ApprovalEntry,
    BaselineMetadata, BaselineRecord, CaptureOutput, CaptureScenario, ScenarioKey, ScenarioStatus,
    UnknownStatus,
};
pub use store::{
    baseline_file_name, capture_file_name, file_name, load_capture, load_record,
    load_record_with_clock, record_paths, save_record, LoadLimits, RecordKind, RecordStore,
    ScenarioListing, DEFAULT_MAX_RECORD_SIZE,
};
