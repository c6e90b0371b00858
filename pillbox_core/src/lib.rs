#![forbid(unsafe_code)]

//! Core domain model and business logic for the Pillbox medication tracker.
//!
//! This crate provides:
//! - Domain types (users, medications, schedule slots, adherence logs)
//! - Storage with uniqueness constraints (in-memory and file-backed)
//! - Daily log materialization and adherence transitions
//! - Adherence summaries for patients and caregivers
//! - Share codes and caregiver links
//! - Label scanning through an external extractor

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod clock;
pub mod store;
pub mod file_store;
pub mod materializer;
pub mod adherence;
pub mod summary;
pub mod share_code;
pub mod accounts;
pub mod medications;
pub mod caregivers;
pub mod scan;
pub mod tracker;

// Re-export commonly used types
pub use error::{Error, Result, ValidationErrors};
pub use types::*;
pub use config::Config;
pub use clock::{Clock, FixedClock, SystemClock};
pub use store::{Database, MemoryStore, Store};
pub use file_store::FileStore;
pub use accounts::NewUser;
pub use medications::MedicationInput;
pub use summary::{summarize, AdherenceSummary, PatientSummary};
pub use scan::{scan_label, CommandExtractor, LabelExtractor, LabelGuess};
pub use tracker::{TodayReport, Tracker};
