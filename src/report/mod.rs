//! Structured result assembly
//!
//! Plain data for downstream rendering: per-group summaries, comparison
//! verdicts, ranked CARI evaluations. JSON and raw-sample CSV are written
//! here; tables, charts and documents are someone else's job.

use crate::campaign::{CampaignRun, CampaignStatus, SampleSet};
use crate::cari::{ProfileEvaluation, ReadinessLevel};
use crate::stats::{self, ComparisonResult, SummaryStatistics};
use crate::{Result, VERSION};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Report provenance
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub generated_at: DateTime<Utc>,
    pub target: String,
    pub tls_backend: &'static str,
    pub harness_version: &'static str,
}

impl ReportMetadata {
    pub fn new(target: &str) -> Self {
        ReportMetadata {
            generated_at: Utc::now(),
            target: target.to_string(),
            tls_backend: "rustls 0.23 + aws-lc-rs",
            harness_version: VERSION,
        }
    }
}

/// One configuration's outcome in the benchmark report
#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub configuration_id: String,
    pub group_name: String,
    #[serde(flatten)]
    pub status: CampaignStatus,
    pub total_attempted: usize,
    pub warmup_discarded: usize,
    /// Absent when the campaign was inconclusive
    pub summary: Option<SummaryStatistics>,
}

/// Full benchmark output for the report adapter
#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub metadata: ReportMetadata,
    pub groups: Vec<GroupReport>,
    pub comparisons: Vec<ComparisonResult>,
}

impl BenchReport {
    /// Summarize completed runs and compare each non-baseline group against
    /// the baseline. Inconclusive runs keep their status but no summary.
    pub fn assemble(
        target: &str,
        runs: &[CampaignRun],
        baseline_group: Option<&str>,
        alpha: f64,
    ) -> Result<Self> {
        let mut groups = Vec::with_capacity(runs.len());
        for run in runs {
            let summary = match run.status {
                CampaignStatus::Inconclusive { .. } => None,
                _ => Some(stats::summarize(&run.sample_set)?),
            };
            groups.push(GroupReport {
                configuration_id: run.sample_set.configuration_id().to_string(),
                group_name: run.sample_set.group_name().to_string(),
                status: run.status.clone(),
                total_attempted: run.sample_set.total_attempted(),
                warmup_discarded: run.sample_set.warmup_discarded(),
                summary,
            });
        }

        let mut comparisons = Vec::new();
        if let Some(baseline_name) = baseline_group {
            let baseline = runs.iter().find(|r| {
                r.sample_set.group_name() == baseline_name
                    && !matches!(r.status, CampaignStatus::Inconclusive { .. })
            });
            if let Some(baseline) = baseline {
                for run in runs {
                    if run.sample_set.group_name() == baseline_name
                        || matches!(run.status, CampaignStatus::Inconclusive { .. })
                    {
                        continue;
                    }
                    match stats::compare(&baseline.sample_set, &run.sample_set, alpha) {
                        Ok(result) => comparisons.push(result),
                        // Degenerate sets cannot be compared; the group report
                        // already carries that information.
                        Err(e) => info!(
                            "skipping comparison {} vs {}: {}",
                            baseline_name,
                            run.sample_set.group_name(),
                            e
                        ),
                    }
                }
            }
        }

        Ok(BenchReport {
            metadata: ReportMetadata::new(target),
            groups,
            comparisons,
        })
    }
}

/// One ranked profile in the CARI report
#[derive(Debug, Clone, Serialize)]
pub struct RankedProfile {
    pub rank: usize,
    pub readiness: ReadinessLevel,
    pub interpretation: &'static str,
    /// Carries the profile name, composite index and contribution breakdown
    #[serde(flatten)]
    pub evaluation: ProfileEvaluation,
}

/// Full CARI output for the report adapter
#[derive(Debug, Clone, Serialize)]
pub struct CariReport {
    pub generated_at: DateTime<Utc>,
    pub harness_version: &'static str,
    pub ranking: Vec<RankedProfile>,
}

impl CariReport {
    /// Wrap ranked evaluations with their interpretation bands.
    pub fn assemble(ranked: Vec<ProfileEvaluation>) -> Self {
        let ranking = ranked
            .into_iter()
            .enumerate()
            .map(|(idx, evaluation)| {
                let readiness = evaluation.readiness();
                RankedProfile {
                    rank: idx + 1,
                    readiness,
                    interpretation: readiness.describe(),
                    evaluation,
                }
            })
            .collect();
        CariReport {
            generated_at: Utc::now(),
            harness_version: VERSION,
            ranking,
        }
    }
}

/// Write any report as pretty JSON.
pub fn write_json<P: AsRef<Path>, T: Serialize>(path: P, report: &T) -> Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path.as_ref(), json)?;
    info!("wrote {}", path.as_ref().display());
    Ok(())
}

/// Dump a sample set's raw trials as CSV, one row per trial, in call order.
/// Elapsed time keeps full sub-millisecond resolution.
pub fn write_samples_csv<P: AsRef<Path>>(path: P, set: &SampleSet) -> Result<()> {
    use std::fmt::Write as _;

    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut out = String::with_capacity(64 * (set.len() + 1));
    out.push_str("configuration_id,group_name,start_timestamp,elapsed_ms,outcome\n");
    for trial in set.trials() {
        let outcome = match &trial.outcome {
            crate::driver::TrialOutcome::Success => "success".to_string(),
            crate::driver::TrialOutcome::Failure(reason) => format!("failure: {}", reason),
        };
        let _ = writeln!(
            out,
            "{},{},{},{:.6},\"{}\"",
            trial.configuration_id,
            trial.group_name,
            trial.start_timestamp.to_rfc3339(),
            trial.elapsed_ms(),
            outcome
        );
    }
    std::fs::write(path.as_ref(), out)?;
    info!("wrote {}", path.as_ref().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::{CampaignConfig, SampleSet};
    use crate::driver::{HandshakeTrial, TrialOutcome};
    use chrono::Utc;
    use std::time::Duration;

    fn run_with(latencies: &[f64], id: &str, group: &str) -> CampaignRun {
        let mut set = SampleSet::new(id, group);
        for &ms in latencies {
            set.push(HandshakeTrial {
                configuration_id: id.to_string(),
                group_name: group.to_string(),
                start_timestamp: Utc::now(),
                elapsed: Duration::from_secs_f64(ms / 1000.0),
                outcome: TrialOutcome::Success,
            })
            .unwrap();
        }
        set.mark_complete();
        CampaignRun {
            config: CampaignConfig {
                group: group.to_string(),
                label: Some(id.to_string()),
                iterations: latencies.len(),
                warmup: 0,
                timeout: Duration::from_secs(5),
            },
            sample_set: set,
            status: CampaignStatus::Completed,
        }
    }

    #[test]
    fn test_bench_report_compares_against_baseline() {
        let runs = vec![
            run_with(&[10.0, 11.0, 12.0, 13.0], "classic", "X25519"),
            run_with(&[10.5, 11.5, 12.5, 13.5], "hybrid", "X25519MLKEM768"),
        ];
        let report = BenchReport::assemble("localhost:4433", &runs, Some("X25519"), 0.05).unwrap();
        assert_eq!(report.groups.len(), 2);
        assert_eq!(report.comparisons.len(), 1);
        assert_eq!(report.comparisons[0].baseline_group, "X25519");
        assert_eq!(report.comparisons[0].candidate_group, "X25519MLKEM768");
    }

    #[test]
    fn test_bench_report_serializes() {
        let runs = vec![run_with(&[10.0, 11.0], "classic", "X25519")];
        let report = BenchReport::assemble("localhost:4433", &runs, None, 0.05).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["groups"][0]["status"], "completed");
        assert_eq!(json["groups"][0]["summary"]["count"], 2);
        assert_eq!(json["metadata"]["target"], "localhost:4433");
    }

    #[test]
    fn test_cari_report_carries_interpretation() {
        let rubric = crate::cari::Rubric::anssi_2024();
        let scores: std::collections::BTreeMap<String, f64> = rubric
            .criteria()
            .iter()
            .map(|c| (c.id.clone(), 0.95))
            .collect();
        let eval = rubric.evaluate("specialists", &scores).unwrap();
        let report = CariReport::assemble(crate::cari::compare_profiles(vec![eval]));
        assert_eq!(report.ranking.len(), 1);
        assert_eq!(report.ranking[0].rank, 1);
        assert_eq!(report.ranking[0].readiness, ReadinessLevel::Excellent);
    }
}
