//! WMS pick-to-light reconciliation
//!
//! Client library for the kit-merge / PTL reconciliation flow at an outbound
//! gate: the WCS/IWMS REST client, the per-gate scan station and the kiosk loop.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod client;
pub mod config;
pub mod errors;
pub mod events;
pub mod kiosk;
pub mod models;
pub mod reconciliation;
pub mod services;

pub use client::{ApiClient, ApiClientConfig, HttpWmsApi, WmsApi};
pub use errors::ServiceError;
pub use events::{Event, EventSender, Notice, Severity};
pub use reconciliation::{PtlStation, ScanOutcome, StationSettings, StationState};
