//! Output generation for run reports.
//!
//! # Submodules
//!
//! - [`json`]: Writes a [`crate::models::RunReport`] for each run

pub mod json;
