//! JSON run report.
//!
//! # Output Structure
//!
//! Reports are organized by date, one file per run:
//! ```text
//! json_output_dir/
//! └── 2025-05-06/
//!     ├── 06-00-12.json
//!     └── 18-00-07.json
//! ```

use crate::models::RunReport;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

/// Write a [`RunReport`] under `{json_output_dir}/{date}/{HH-MM-SS}.json`.
///
/// Returns the path written.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir))]
pub async fn write_report(
    report: &RunReport,
    json_output_dir: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(report)?;

    let full_json_dir = PathBuf::from(json_output_dir).join(&report.local_date);
    info!(dir = %full_json_dir.display(), "Ensuring JSON directory exists");
    if let Err(e) = fs::create_dir_all(&full_json_dir).await {
        error!(dir = %full_json_dir.display(), error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let output_json_filename =
        full_json_dir.join(format!("{}.json", report.local_time.replace(':', "-")));
    fs::write(&output_json_filename, json).await?;
    info!(path = %output_json_filename.display(), "Wrote run report");

    Ok(output_json_filename)
}
