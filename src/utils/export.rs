//! CSV export of the mission summary: one aggregated row per controller run.
//!
//! Appends to a persistent file so successive runs (and restarts after a
//! watchdog reset) build up a history. Header is written on first use.

use crate::utils::metrics::{calculate_stats, calculate_stats_u64, lock, SharedMetrics};
use anyhow::Context;
use csv::WriterBuilder;
use log::info;
use serde::Serialize;
use std::{
    fs::{create_dir_all, OpenOptions},
    path::Path,
};

#[derive(Debug, Serialize)]
struct SummaryRow {
    restarts: u32,
    total_ticks: u64,
    telemetry_sent: u64,
    images_sent: u64,
    image_chunks: u64,
    images_skipped: u64,
    commands_acked: u64,
    commands_rejected: u64,
    lines_unhandled: u64,
    buffer_overflows: u64,
    deadline_miss: u64,
    telemetry_resyncs: u64,
    max_tick_us: f64,
    avg_tick_us: f64,
    min_altitude_ft: f64,
    max_altitude_ft: f64,
    last_phase: String,
}

/// Appends the current metrics as one row of `csv_path`.
pub fn export_summary_csv(metrics: &SharedMetrics, csv_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = csv_path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent).with_context(|| format!("cannot create {}", parent.display()))?;
        }
    }
    let file_exists = csv_path.exists();

    let row = {
        let m = lock(metrics);
        let ticks = calculate_stats_u64(&m.tick_us);
        let altitude = calculate_stats(&m.altitude_ft);
        SummaryRow {
            restarts: m.restarts,
            total_ticks: m.total_ticks,
            telemetry_sent: m.telemetry_sent,
            images_sent: m.images_sent,
            image_chunks: m.image_chunks,
            images_skipped: m.images_skipped,
            commands_acked: m.commands_acked,
            commands_rejected: m.commands_rejected,
            lines_unhandled: m.lines_unhandled,
            buffer_overflows: m.buffer_overflows,
            deadline_miss: m.deadline_miss,
            telemetry_resyncs: m.telemetry_resyncs,
            max_tick_us: ticks.as_ref().map(|s| s.max).unwrap_or(0.0),
            avg_tick_us: ticks.as_ref().map(|s| s.mean).unwrap_or(0.0),
            min_altitude_ft: altitude.as_ref().map(|s| s.min).unwrap_or(0.0),
            max_altitude_ft: altitude.as_ref().map(|s| s.max).unwrap_or(0.0),
            last_phase: m.last_phase.unwrap_or("UNKNOWN").to_string(),
        }
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(csv_path)
        .with_context(|| format!("cannot open {}", csv_path.display()))?;

    let mut wtr = WriterBuilder::new().has_headers(!file_exists).from_writer(file);
    wtr.serialize(&row).context("failed to write summary row")?;
    wtr.flush().context("failed to flush summary")?;

    info!("Mission summary exported to: {}", csv_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::metrics::{push_capped, push_capped_u64, shared_metrics};

    #[test]
    fn test_summary_header_written_once() {
        let dir = std::env::temp_dir().join(format!("rover_payload_export_{}", std::process::id()));
        let path = dir.join("summary.csv");
        let _ = std::fs::remove_file(&path);

        let metrics = shared_metrics();
        {
            let mut m = lock(&metrics);
            m.telemetry_sent = 4;
            m.last_phase = Some("LANDED");
            push_capped(&mut m.altitude_ft, 12.5);
            push_capped(&mut m.altitude_ft, 0.5);
            push_capped_u64(&mut m.tick_us, 300);
        }

        export_summary_csv(&metrics, &path).unwrap();
        export_summary_csv(&metrics, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("restarts,total_ticks,telemetry_sent"));
        assert!(lines[1].ends_with("LANDED"));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_unwritable_path_reports_it() {
        let dir = std::env::temp_dir().join(format!("rover_payload_export_dir_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        // the target is a directory, so opening it for append fails
        let err = export_summary_csv(&shared_metrics(), &dir).unwrap_err();
        assert!(err.to_string().starts_with("cannot open"), "{}", err);
        assert!(err.root_cause().downcast_ref::<std::io::Error>().is_some());
        let _ = std::fs::remove_dir_all(dir);
    }
}
