//! Operator-facing run output.
//!
//! The orchestrator writes human-readable lines through a [`Reporter`];
//! this module owns the line formats. Logs go through `tracing`, reports
//! go through here, so the two can be routed to different streams.
//!
//! ```text
//! [1/28] OK   ALTER TABLE storage.objects ENABLE ROW LEVEL SECURITY;...
//! [17/28] FAIL CREATE POLICY "pet_photos_select" ON storage.objects FOR SE... - policy "pet_photos_select" for table "objects" alrea (already exists)
//! ```

use std::sync::Mutex;

use storage_policy_model::PolicyStatement;

use crate::applier::ApplicationResult;
use crate::orchestrator::{RunReport, RunStatus};
use crate::verifier::VerificationSnapshot;

/// Characters of statement text shown per result line.
pub const PREVIEW_WIDTH: usize = 60;

/// Sink for report lines.
pub trait Reporter: Send + Sync {
    /// Write one line.
    fn emit(&self, line: &str);
}

/// Writes report lines to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn emit(&self, line: &str) {
        println!("{}", line);
    }
}

/// Keeps report lines in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    lines: Mutex<Vec<String>>,
}

impl MemoryReporter {
    /// Create an empty reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines emitted so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Check whether any emitted line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

impl Reporter for MemoryReporter {
    fn emit(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}

/// Result line for one statement.
pub fn statement_line(statement: &PolicyStatement, result: &ApplicationResult, total: usize) -> String {
    let position = format!("[{}/{}]", result.statement_index, total);
    let preview = statement.preview(PREVIEW_WIDTH);

    if result.succeeded {
        return format!("{} OK   {}...", position, preview);
    }

    let mut line = format!("{} FAIL {}...", position, preview);
    if let Some(summary) = &result.error_summary {
        line.push_str(" - ");
        line.push_str(summary);
    }
    if let Some(kind) = result.rejection {
        line.push_str(&format!(" ({})", kind.as_str()));
    }
    line
}

/// Policy and bucket listing. A listing that could not be read is
/// replaced by a [`degraded_line`].
pub fn verification_lines(snapshot: &VerificationSnapshot) -> Vec<String> {
    let mut lines = Vec::with_capacity(snapshot.policies.len() + snapshot.buckets.len() + 2);

    match &snapshot.policies_error {
        Some(e) => lines.push(degraded_line("policies", e)),
        None => {
            lines.push(format!("Installed policies ({}):", snapshot.policies.len()));
            for policy in &snapshot.policies {
                lines.push(format!("  - {} ({})", policy.name, policy.action));
            }
        }
    }

    match &snapshot.buckets_error {
        Some(e) => lines.push(degraded_line("buckets", e)),
        None => {
            lines.push(format!("Buckets ({}):", snapshot.buckets.len()));
            for bucket in &snapshot.buckets {
                let visibility = if bucket.is_public { "public" } else { "private" };
                lines.push(format!("  - {} ({})", bucket.name, visibility));
            }
        }
    }

    lines
}

/// Line for a listing that could not be read.
pub fn degraded_line(part: &str, error: &str) -> String {
    format!("Could not confirm final state of {}: {}", part, error)
}

/// Closing summary of a run.
pub fn banner(report: &RunReport) -> String {
    match report.status {
        RunStatus::Succeeded => {
            let mut line = format!(
                "Applied {}/{} statements",
                report.succeeded_count(),
                report.results.len()
            );
            if report.failed_count() > 0 {
                line.push_str(&format!(
                    " ({} failed, {} already present)",
                    report.failed_count(),
                    report.benign_count()
                ));
            }
            if !report.is_verified() {
                line.push_str("; final state unconfirmed");
            }
            line
        }
        RunStatus::Failed => format!(
            "Run failed: {}",
            report.failure.as_deref().unwrap_or("unknown error")
        ),
    }
}

/// Numbered plan listing for dry runs.
pub fn plan_lines(statements: &[PolicyStatement]) -> Vec<String> {
    let total = statements.len();
    statements
        .iter()
        .map(|s| {
            format!(
                "[{}/{}] {:<13} {}",
                s.sequence_index,
                total,
                s.kind.as_str(),
                s.target_name
            )
        })
        .collect()
}
