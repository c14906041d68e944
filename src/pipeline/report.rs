use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::enrichment::{FailureReason, Outcome};
use crate::error::{Error, Result};

/// Counters accumulated over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    /// Subset of `failed` whose identifier was missing or malformed
    pub malformed: usize,
    /// Records taken from the checkpoint
    pub resumed: usize,
    pub batches: usize,
    pub failed_batches: usize,
    /// Distinct identifiers that received secondary analysis
    pub analyzed: usize,
}

impl RunStats {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Enriched => self.success += 1,
            Outcome::Failed(reason) => {
                self.failed += 1;
                if reason == FailureReason::MalformedIdentifier {
                    self.malformed += 1;
                }
            }
        }
    }

    /// `success / total`, 0 for an empty run.
    pub fn enhancement_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.success as f64 / self.total as f64
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    #[serde(flatten)]
    pub stats: RunStats,
    pub enhancement_rate: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn new(stats: RunStats, started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> Self {
        Self {
            enhancement_rate: stats.enhancement_rate(),
            stats,
            started_at,
            finished_at,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Error::from)
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()? + "\n")
            .map_err(|e| Error::Io(e).context(format!("writing report to {}", path.display())))
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        writeln!(f, "Enrichment complete")?;
        writeln!(f, "  Total records:    {}", s.total)?;
        writeln!(f, "  Enriched:         {}", s.success)?;
        writeln!(f, "  Failed:           {}", s.failed)?;
        if s.malformed > 0 {
            writeln!(f, "    bad identifier: {}", s.malformed)?;
        }
        if s.resumed > 0 {
            writeln!(f, "  Resumed:          {}", s.resumed)?;
        }
        writeln!(
            f,
            "  Batches:          {} ({} failed)",
            s.batches, s.failed_batches
        )?;
        if s.analyzed > 0 {
            writeln!(f, "  Analyzed:         {}", s.analyzed)?;
        }
        let elapsed = self.finished_at - self.started_at;
        writeln!(f, "  Elapsed:          {:.1}s", elapsed.num_milliseconds() as f64 / 1000.0)?;
        write!(f, "  Enhancement rate: {:.1}%", self.enhancement_rate * 100.0)
    }
}
