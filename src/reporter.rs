use std::collections::HashMap;

use tracing::info;

use crate::types::{Alert, WatchedListing};

/// Destination for user-facing notifications. Fire-and-forget.
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: &Alert);
}

/// Writes each alert as one JSON line to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonLineReporter;

impl AlertSink for JsonLineReporter {
    fn notify(&self, alert: &Alert) {
        info!("[{}] {}", alert.listing_id, alert.message);
        report_alert(alert);
    }
}

/// Emit an alert as a single JSON line to stdout.
pub fn report_alert(alert: &Alert) {
    if let Some(line) = alert_line(alert) {
        println!("{line}");
    }
}

/// Emit the watch registry as pretty-printed JSON to stdout.
pub fn report_registry(entries: &HashMap<String, WatchedListing>) {
    if let Ok(json) = serde_json::to_string_pretty(entries) {
        println!("{json}");
    }
}

fn alert_line(alert: &Alert) -> Option<String> {
    serde_json::to_string(alert).ok()
}
