//! The JSON result printed by `update-excel`.

use crate::booking::Booking;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::updater::{LedgerUpdater, UpdateOutcome};
use log::{error, warn};
use serde::Serialize;

/// `{"success":true,"file_name":..,"row":..,"file_path":..,"output_path":..}`
/// or `{"success":false,"error":..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UpdateReport {
    pub fn success(outcome: &UpdateOutcome) -> Self {
        Self {
            success: true,
            file_name: Some(outcome.file_name.clone()),
            row: Some(outcome.row),
            file_path: Some(outcome.file_path.display().to_string()),
            output_path: Some(outcome.output_path.display().to_string()),
            error: None,
        }
    }

    pub fn failure(err: &LedgerError) -> Self {
        Self {
            success: false,
            file_name: None,
            row: None,
            file_path: None,
            output_path: None,
            error: Some(err.to_string()),
        }
    }

    pub fn exit_code(&self) -> u8 {
        if self.success { 0 } else { 1 }
    }

    /// Single-line JSON, non-ASCII left unescaped.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "success": false, "error": e.to_string() }).to_string()
        })
    }
}

/// Decodes `raw` as a booking and applies it. Every failure comes back as a
/// failed report.
pub fn run(raw: Option<&str>, config: &LedgerConfig) -> UpdateReport {
    match execute(raw, config) {
        Ok(outcome) => UpdateReport::success(&outcome),
        Err(err) => {
            if err.is_input_error() {
                warn!("{err}");
            } else {
                error!("{err}");
            }
            UpdateReport::failure(&err)
        }
    }
}

fn execute(raw: Option<&str>, config: &LedgerConfig) -> Result<UpdateOutcome> {
    let raw = raw
        .filter(|r| !r.trim().is_empty())
        .ok_or(LedgerError::MissingArgument)?;
    let booking = Booking::from_json(raw)?;
    LedgerUpdater::new(config)?.apply(&booking)
}
