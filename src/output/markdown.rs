//! Markdown summary generation
//!
//! This module generates a human-readable markdown report of a crawl run:
//! run metadata, outcome breakdown and per-domain results.

use crate::output::traits::{CrawlSummary, OutputResult};
use crate::state::UrlOutcome;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes the markdown summary of `summary` to `output_path`
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(OutputError)` - Failed to write summary
pub fn generate_markdown_summary(summary: &CrawlSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a crawl summary as markdown
pub fn format_markdown_summary(summary: &CrawlSummary) -> String {
    let mut md = String::new();

    md.push_str("# Product Scout Crawl Summary\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    if let Some(run_id) = summary.run_id {
        md.push_str(&format!("- **Run ID**: {}\n", run_id));
    }
    md.push_str(&format!("- **Started**: {}\n", summary.started_at.to_rfc3339()));
    if let Some(finished) = &summary.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished.to_rfc3339()));
    }
    if let Some(duration) = summary.duration_seconds() {
        md.push_str(&format!(
            "- **Duration**: {} seconds ({:.2} minutes)\n",
            duration,
            duration as f64 / 60.0
        ));
    }
    md.push_str(&format!("- **Status**: {}\n", summary.status));
    if !summary.config_hash.is_empty() {
        md.push_str(&format!("- **Config Hash**: {}\n", summary.config_hash));
    }
    md.push('\n');

    // Overall statistics
    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!("- **URLs Seen**: {}\n", summary.urls_seen()));
    md.push_str(&format!("- **Products Found**: {}\n", summary.count(UrlOutcome::Product)));
    md.push_str(&format!("- **Products Emitted This Run**: {}\n", summary.products_emitted));
    md.push_str(&format!("- **Domains**: {}\n", summary.domains.len()));
    md.push_str(&format!("- **Frontier Remaining**: {}\n", summary.frontier_remaining));
    md.push_str(&format!("- **Success Rate**: {:.2}%\n", summary.success_rate()));
    md.push_str(&format!("- **Error Rate**: {:.2}%\n\n", summary.error_rate()));

    // Outcome breakdown
    md.push_str("## URL Outcomes\n\n");
    md.push_str("| Outcome | Count |\n");
    md.push_str("|---------|-------|\n");
    for outcome in UrlOutcome::all() {
        md.push_str(&format!("| {} | {} |\n", outcome, summary.count(*outcome)));
    }
    md.push('\n');

    // Per-domain results, most products first
    if !summary.domains.is_empty() {
        let mut domains: Vec<_> = summary.domains.iter().collect();
        domains.sort_by(|a, b| b.products.cmp(&a.products).then_with(|| a.domain.cmp(&b.domain)));

        md.push_str("## Domains\n\n");
        md.push_str("| Domain | Products | Requests | Succeeded | Failed | Blocked | Pending | Success Rate |\n");
        md.push_str("|--------|----------|----------|-----------|--------|---------|---------|--------------|\n");
        for domain in domains {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {} | {:.1}% |\n",
                domain.domain,
                domain.products,
                domain.dispatched,
                domain.succeeded,
                domain.failed,
                domain.blocked,
                domain.pending,
                domain.success_rate()
            ));
        }
        md.push('\n');
    }

    md
}
