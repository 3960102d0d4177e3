#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Weigh-station acquisition pipeline (hardware-agnostic).
//!
//! All device I/O goes through `weigh_traits::Transport`; time goes through
//! `weigh_traits::Clock` so the loop can be driven deterministically in tests.
//!
//! ## Pipeline
//!
//! transport frame -> `decoder` (ordered strategies, unit normalization) ->
//! `calibration` (signed linear raw -> grams) -> `filter` (median, EMA,
//! stability) -> `state` (latest snapshot + diagnostic log).
//!
//! `acquisition` runs that pipeline on one worker thread with reconnect
//! backoff. `drift` is a separate zero-tracking stage a consumer applies to
//! committed readings.

pub mod acquisition;
pub mod calibration;
pub mod config;
pub mod conversions;
pub mod decoder;
pub mod drift;
pub mod error;
pub mod filter;
pub mod hw_error;
pub mod mocks;
pub mod persist;
pub mod state;
pub mod transport;
pub mod util;

pub use acquisition::{Acquisition, CALIBRATION_SAMPLES, SharedClock};
pub use calibration::Calibration;
pub use config::{AcquisitionCfg, DriftCfg, FilterCfg, PipelineCfg};
pub use decoder::{DecodedSample, FrameDecoder, StabilityHint, Strategy, Unit};
pub use drift::DriftCompensator;
pub use error::{Result, WeighError};
pub use state::{DiagnosticLogEntry, LinkState, Snapshot};
