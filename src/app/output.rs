//! Stdout formatting for discovery listings and batch summaries.

use anyhow::{Context, Result};
use image_downloader_core::{BatchSummary, DownloadOutcome, ImageCandidates};

/// Renders the numbered candidate list followed by the count line.
pub(crate) fn candidate_lines(candidates: &ImageCandidates) -> Vec<String> {
    let mut lines: Vec<String> = candidates
        .iter()
        .enumerate()
        .map(|(index, url)| format!("{:>3}. {url}", index + 1))
        .collect();
    lines.push(format!("Found {} images", candidates.len()));
    lines
}

pub(crate) fn print_candidates(candidates: &ImageCandidates, json: bool) -> Result<()> {
    if json {
        let rendered =
            serde_json::to_string_pretty(candidates).context("failed to serialize candidates")?;
        println!("{rendered}");
        return Ok(());
    }
    for line in candidate_lines(candidates) {
        println!("{line}");
    }
    Ok(())
}

/// Lines for the per-item failures, in request order.
pub(crate) fn failure_lines(summary: &BatchSummary) -> Vec<String> {
    summary
        .outcomes
        .iter()
        .filter_map(|item| match &item.outcome {
            DownloadOutcome::Failure { reason } => {
                Some(format!("  #{} {}: {reason}", item.position, item.url))
            }
            DownloadOutcome::Success { .. } => None,
        })
        .collect()
}

pub(crate) fn print_summary(summary: &BatchSummary, json: bool, quiet: bool) -> Result<()> {
    if json {
        let rendered =
            serde_json::to_string_pretty(summary).context("failed to serialize summary")?;
        println!("{rendered}");
        return Ok(());
    }
    println!("{}", summary.message());
    if !quiet {
        for line in failure_lines(summary) {
            println!("{line}");
        }
    }
    Ok(())
}
