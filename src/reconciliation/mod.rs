//! Kit-merge pick-to-light reconciliation: scan classification and the
//! per-gate station state machine.

pub mod scan;
pub mod station;

pub use scan::{parse_quantity, ScanClassifier, ScanInput};
pub use station::{PtlStation, ScanOutcome, StationSettings, StationState};
