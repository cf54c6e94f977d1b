//! Statistics reducer
//!
//! Reduces a closed [`SampleSet`] into summary statistics and compares two
//! sets with a two-sided Mann–Whitney U test. Latency distributions are
//! right-skewed, so the comparison is rank-based rather than a t-test.
//!
//! Percentile rule: linear interpolation between order statistics, at
//! `rank = p/100 * (n - 1)`. The rule is fixed so cross-run comparisons stay
//! reproducible. Standard deviation is the sample (n-1) form.

use crate::campaign::{SampleSet, SampleState};
use crate::{Error, Result};
use serde::Serialize;
use std::cmp::Ordering;

/// Default significance level for the comparison verdict
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Summary of one sample set's success latencies, in milliseconds.
///
/// Derived on demand from its source set, never persisted independently.
/// `count == 0` is the degenerate form: every aggregate is meaningless and
/// callers must treat the result as inconclusive, not as zero latency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStatistics {
    pub count: usize,
    pub failure_count: usize,
    pub mean_ms: f64,
    pub median_ms: f64,
    pub std_dev_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl SummaryStatistics {
    /// True when no successful trial exists to aggregate over
    pub fn is_degenerate(&self) -> bool {
        self.count == 0
    }
}

/// Verdict of the two-sample significance test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignificanceVerdict {
    Significant,
    NotSignificant,
}

/// Outcome of comparing a candidate group against a baseline group
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonResult {
    pub baseline_group: String,
    pub candidate_group: String,
    pub baseline_mean_ms: f64,
    pub candidate_mean_ms: f64,
    pub delta_mean_ms: f64,
    pub delta_percent: f64,
    pub p_value: f64,
    pub alpha: f64,
    pub verdict: SignificanceVerdict,
}

/// Reduce a closed sample set into summary statistics.
///
/// Failure trials feed `failure_count` only. A set still collecting cannot
/// be summarized; an aborted set is inconclusive by definition and is
/// refused here so its numbers can never masquerade as a valid summary.
pub fn summarize(set: &SampleSet) -> Result<SummaryStatistics> {
    match set.state() {
        SampleState::Empty | SampleState::Collecting => {
            return Err(Error::validation(format!(
                "sample set {} is still collecting",
                set.configuration_id()
            )));
        }
        SampleState::Aborted => {
            return Err(Error::validation(format!(
                "sample set {} was aborted; campaign is inconclusive",
                set.configuration_id()
            )));
        }
        SampleState::Complete | SampleState::Summarized => {}
    }

    let mut latencies = set.success_latencies_ms();
    let failure_count = set.failure_count();

    if latencies.is_empty() {
        set.note_summarized();
        return Ok(SummaryStatistics {
            count: 0,
            failure_count,
            mean_ms: 0.0,
            median_ms: 0.0,
            std_dev_ms: 0.0,
            min_ms: 0.0,
            max_ms: 0.0,
            p95_ms: 0.0,
            p99_ms: 0.0,
        });
    }

    latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let count = latencies.len();
    let mean = latencies.iter().sum::<f64>() / count as f64;
    let std_dev = if count > 1 {
        let ss: f64 = latencies.iter().map(|x| (x - mean).powi(2)).sum();
        (ss / (count - 1) as f64).sqrt()
    } else {
        0.0
    };

    set.note_summarized();
    Ok(SummaryStatistics {
        count,
        failure_count,
        mean_ms: mean,
        median_ms: percentile_sorted(&latencies, 50.0),
        std_dev_ms: std_dev,
        min_ms: latencies[0],
        max_ms: latencies[count - 1],
        p95_ms: percentile_sorted(&latencies, 95.0),
        p99_ms: percentile_sorted(&latencies, 99.0),
    })
}

/// Percentile of an ascending-sorted slice by linear interpolation between
/// order statistics. Returns NaN on an empty slice.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let p = p.clamp(0.0, 100.0);
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let frac = rank - lower as f64;
    if lower + 1 >= sorted.len() {
        return sorted[sorted.len() - 1];
    }
    sorted[lower] + frac * (sorted[lower + 1] - sorted[lower])
}

/// Compare candidate against baseline with a two-sided Mann–Whitney U test.
///
/// Both sets must be Complete with at least one success each; anything else
/// is a validation error rather than a fabricated verdict.
pub fn compare(baseline: &SampleSet, candidate: &SampleSet, alpha: f64) -> Result<ComparisonResult> {
    if !(0.0..1.0).contains(&alpha) || alpha <= 0.0 {
        return Err(Error::validation(format!(
            "significance level must be in (0, 1), got {}",
            alpha
        )));
    }

    let base_summary = summarize(baseline)?;
    let cand_summary = summarize(candidate)?;
    if base_summary.is_degenerate() || cand_summary.is_degenerate() {
        return Err(Error::validation(
            "cannot compare: a sample set has no successful trials",
        ));
    }

    let base = baseline.success_latencies_ms();
    let cand = candidate.success_latencies_ms();
    let p_value = mann_whitney_p(&base, &cand);

    let delta_mean_ms = cand_summary.mean_ms - base_summary.mean_ms;
    let verdict = if p_value < alpha {
        SignificanceVerdict::Significant
    } else {
        SignificanceVerdict::NotSignificant
    };

    Ok(ComparisonResult {
        baseline_group: baseline.group_name().to_string(),
        candidate_group: candidate.group_name().to_string(),
        baseline_mean_ms: base_summary.mean_ms,
        candidate_mean_ms: cand_summary.mean_ms,
        delta_mean_ms,
        delta_percent: 100.0 * delta_mean_ms / base_summary.mean_ms,
        p_value,
        alpha,
        verdict,
    })
}

/// Two-sided Mann–Whitney U p-value via the normal approximation with tie
/// correction. Good for the sample sizes this harness produces (hundreds to
/// thousands); no continuity correction is applied.
fn mann_whitney_p(xs: &[f64], ys: &[f64]) -> f64 {
    let n1 = xs.len() as f64;
    let n2 = ys.len() as f64;

    let mut combined: Vec<(f64, bool)> = xs
        .iter()
        .map(|&v| (v, true))
        .chain(ys.iter().map(|&v| (v, false)))
        .collect();
    combined.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    // Average ranks across tie groups; track the tie correction term.
    let n = combined.len();
    let mut rank_sum_x = 0.0;
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && combined[j + 1].0 == combined[i].0 {
            j += 1;
        }
        let ties = (j - i + 1) as f64;
        let avg_rank = (i + j + 2) as f64 / 2.0;
        for entry in &combined[i..=j] {
            if entry.1 {
                rank_sum_x += avg_rank;
            }
        }
        if ties > 1.0 {
            tie_term += ties * ties * ties - ties;
        }
        i = j + 1;
    }

    let u1 = rank_sum_x - n1 * (n1 + 1.0) / 2.0;
    let mean_u = n1 * n2 / 2.0;
    let total = n1 + n2;
    let variance = n1 * n2 / 12.0 * ((total + 1.0) - tie_term / (total * (total - 1.0)));
    if variance <= 0.0 {
        // Every observation tied: no evidence of any difference.
        return 1.0;
    }

    let z = (u1 - mean_u) / variance.sqrt();
    (2.0 * (1.0 - normal_cdf(z.abs()))).min(1.0)
}

/// Standard normal CDF via the Abramowitz–Stegun 7.1.26 erf approximation
/// (max absolute error 1.5e-7, ample for a verdict at alpha = 0.05).
fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}
