//! Sampling controller
//!
//! Orchestrates repeated handshake trials per campaign configuration:
//! warm-up trials are discarded, measured trials are appended to the
//! configuration's [`SampleSet`] in call order, strictly sequentially.
//! Concurrent handshakes would inflate the very latency being measured, so
//! one trial completes before the next starts.

use crate::driver::{HandshakeTrial, Prober};
use crate::{Error, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default failure-rate threshold above which a configuration is aborted
pub const DEFAULT_FAILURE_THRESHOLD: f64 = 0.05;

/// One campaign configuration: which group to pin and how much to sample
#[derive(Debug, Clone)]
pub struct CampaignConfig {
    /// Key-exchange group to pin for every trial
    pub group: String,
    /// Label used as configuration_id on trials; defaults to the group name
    pub label: Option<String>,
    /// Number of measured trials
    pub iterations: usize,
    /// Number of discarded warm-up trials run first
    pub warmup: usize,
    /// Per-trial timeout
    pub timeout: Duration,
}

impl CampaignConfig {
    pub fn configuration_id(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.group)
    }
}

/// Observable lifecycle of a sample set.
///
/// Empty → Collecting → Complete | Aborted, and Complete → Summarized once a
/// summary has been taken. There is no way back to Collecting; re-measurement
/// means a new set, the old one is kept for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleState {
    Empty,
    Collecting,
    Complete,
    Aborted,
    Summarized,
}

#[derive(Debug, PartialEq, Eq)]
enum Phase {
    Collecting,
    Complete,
    Aborted,
}

/// Ordered record of measured trials for one (configuration, group) pair.
///
/// Owned and mutated exclusively by the controller while collecting; once
/// Complete it is immutable and may be read freely.
#[derive(Debug)]
pub struct SampleSet {
    configuration_id: String,
    group_name: String,
    trials: Vec<HandshakeTrial>,
    warmup_discarded: usize,
    phase: Phase,
    summarized: AtomicBool,
}

impl SampleSet {
    pub fn new(configuration_id: &str, group_name: &str) -> Self {
        SampleSet {
            configuration_id: configuration_id.to_string(),
            group_name: group_name.to_string(),
            trials: Vec::new(),
            warmup_discarded: 0,
            phase: Phase::Collecting,
            summarized: AtomicBool::new(false),
        }
    }

    pub fn configuration_id(&self) -> &str {
        &self.configuration_id
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub fn state(&self) -> SampleState {
        match self.phase {
            Phase::Collecting if self.trials.is_empty() => SampleState::Empty,
            Phase::Collecting => SampleState::Collecting,
            Phase::Aborted => SampleState::Aborted,
            Phase::Complete if self.summarized.load(Ordering::Relaxed) => SampleState::Summarized,
            Phase::Complete => SampleState::Complete,
        }
    }

    /// A set is readable once collection has stopped, one way or the other.
    pub fn is_closed(&self) -> bool {
        self.phase != Phase::Collecting
    }

    pub fn is_aborted(&self) -> bool {
        self.phase == Phase::Aborted
    }

    /// Record one measured trial, preserving call order.
    ///
    /// All trials in a set must share the same configuration and group; a
    /// mismatch or a push after close is a bug in the caller.
    pub fn push(&mut self, trial: HandshakeTrial) -> Result<()> {
        if self.is_closed() {
            return Err(Error::internal(format!(
                "sample set {} is no longer collecting",
                self.configuration_id
            )));
        }
        if trial.configuration_id != self.configuration_id || trial.group_name != self.group_name {
            return Err(Error::internal(format!(
                "trial for {}/{} pushed into sample set {}/{}",
                trial.configuration_id, trial.group_name, self.configuration_id, self.group_name
            )));
        }
        self.trials.push(trial);
        Ok(())
    }

    /// Count one discarded warm-up trial (kept for the attempted total only).
    fn note_warmup(&mut self) {
        self.warmup_discarded += 1;
    }

    /// Close the set for reading. Only the collecting owner may call this;
    /// afterwards the set is immutable.
    pub fn mark_complete(&mut self) {
        self.phase = Phase::Complete;
    }

    /// Close the set as aborted; its trials are kept for audit but it can
    /// never be summarized.
    pub fn mark_aborted(&mut self) {
        self.phase = Phase::Aborted;
    }

    /// Flip Complete → Summarized. Trial data is untouched, so summaries
    /// stay idempotent.
    pub(crate) fn note_summarized(&self) {
        self.summarized.store(true, Ordering::Relaxed);
    }

    /// Measured trials recorded, in call order
    pub fn trials(&self) -> &[HandshakeTrial] {
        &self.trials
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn warmup_discarded(&self) -> usize {
        self.warmup_discarded
    }

    /// Warm-up and measured trials together
    pub fn total_attempted(&self) -> usize {
        self.warmup_discarded + self.trials.len()
    }

    pub fn failure_count(&self) -> usize {
        self.trials.iter().filter(|t| !t.is_success()).count()
    }

    /// Success latencies in milliseconds, in call order
    pub fn success_latencies_ms(&self) -> Vec<f64> {
        self.trials
            .iter()
            .filter(|t| t.is_success())
            .map(|t| t.elapsed_ms())
            .collect()
    }
}

/// How a configuration's campaign ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "status")]
pub enum CampaignStatus {
    /// All planned trials ran (or the user cancelled after a valid partial set)
    Completed,
    /// User cancellation; the partial set is valid and summarizable
    Cancelled,
    /// Failure budget exceeded; the set must not be summarized
    Inconclusive { failures: usize, budget: usize },
}

/// One configuration's sample set plus how its campaign ended
#[derive(Debug)]
pub struct CampaignRun {
    pub config: CampaignConfig,
    pub sample_set: SampleSet,
    pub status: CampaignStatus,
}

/// Drives campaigns through a [`Prober`], strictly sequentially.
pub struct SamplingController<P: Prober> {
    prober: P,
    failure_threshold: f64,
    /// Optional pause between trials, to avoid tripping endpoint rate limits
    trial_pause: Option<Duration>,
    /// Optional pause between configurations
    config_pause: Option<Duration>,
}

impl<P: Prober> SamplingController<P> {
    pub fn new(prober: P) -> Self {
        SamplingController {
            prober,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            trial_pause: None,
            config_pause: None,
        }
    }

    pub fn with_failure_threshold(mut self, threshold: f64) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_trial_pause(mut self, pause: Option<Duration>) -> Self {
        self.trial_pause = pause;
        self
    }

    pub fn with_config_pause(mut self, pause: Option<Duration>) -> Self {
        self.config_pause = pause;
        self
    }

    /// Run every configuration in order, never overlapping in time.
    ///
    /// Cancellation stops before the next trial starts; already-collected
    /// partial sets are kept, marked Complete and reported as Cancelled.
    pub async fn run_campaign(
        &self,
        configs: &[CampaignConfig],
        cancel: &CancellationToken,
    ) -> Result<Vec<CampaignRun>> {
        validate_configs(configs)?;

        let mut runs = Vec::with_capacity(configs.len());
        for (idx, config) in configs.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            if idx > 0 {
                if let Some(pause) = self.config_pause {
                    tokio::time::sleep(pause).await;
                }
            }
            info!(
                "campaign {}: {} iterations (+{} warm-up) on group {}",
                config.configuration_id(),
                config.iterations,
                config.warmup,
                config.group
            );
            runs.push(self.run_configuration(config, cancel).await);
        }
        Ok(runs)
    }

    async fn run_configuration(
        &self,
        config: &CampaignConfig,
        cancel: &CancellationToken,
    ) -> CampaignRun {
        let id = config.configuration_id();
        let mut set = SampleSet::new(id, &config.group);

        // Warm-up trials flush cold caches and any lingering endpoint state;
        // their outcomes are discarded.
        for _ in 0..config.warmup {
            if cancel.is_cancelled() {
                set.mark_complete();
                return CampaignRun {
                    config: config.clone(),
                    sample_set: set,
                    status: CampaignStatus::Cancelled,
                };
            }
            let _ = self.prober.probe(id, &config.group, config.timeout).await;
            set.note_warmup();
            self.pause_between_trials().await;
        }

        // A configuration may fail at most floor(threshold * iterations)
        // trials; one more aborts it as inconclusive.
        let budget = (self.failure_threshold * config.iterations as f64).floor() as usize;
        let mut failures = 0;

        for _ in 0..config.iterations {
            if cancel.is_cancelled() {
                info!("campaign {}: cancelled after {} trials", id, set.len());
                set.mark_complete();
                return CampaignRun {
                    config: config.clone(),
                    sample_set: set,
                    status: CampaignStatus::Cancelled,
                };
            }

            let trial = self.prober.probe(id, &config.group, config.timeout).await;
            if let crate::driver::TrialOutcome::Failure(ref reason) = trial.outcome {
                failures += 1;
                warn!("campaign {}: trial failed ({})", id, reason);
            }
            if set.push(trial).is_err() {
                // Unreachable while the controller owns the set; keep the
                // campaign alive regardless.
                debug!("campaign {}: dropped mismatched trial", id);
            }

            if failures > budget {
                warn!(
                    "campaign {}: aborting, {} failures exceed budget of {}",
                    id, failures, budget
                );
                set.mark_aborted();
                return CampaignRun {
                    config: config.clone(),
                    sample_set: set,
                    status: CampaignStatus::Inconclusive { failures, budget },
                };
            }

            self.pause_between_trials().await;
        }

        info!(
            "campaign {}: complete, {}/{} trials succeeded",
            id,
            set.len() - set.failure_count(),
            set.len()
        );
        set.mark_complete();
        CampaignRun {
            config: config.clone(),
            sample_set: set,
            status: CampaignStatus::Completed,
        }
    }

    async fn pause_between_trials(&self) {
        if let Some(pause) = self.trial_pause {
            tokio::time::sleep(pause).await;
        }
    }
}

fn validate_configs(configs: &[CampaignConfig]) -> Result<()> {
    if configs.is_empty() {
        return Err(Error::config("no campaign configurations given"));
    }
    let mut seen = std::collections::HashSet::new();
    for config in configs {
        if config.iterations == 0 {
            return Err(Error::config(format!(
                "campaign {} has zero iterations",
                config.configuration_id()
            )));
        }
        if !seen.insert(config.configuration_id()) {
            return Err(Error::config(format!(
                "duplicate campaign configuration '{}'",
                config.configuration_id()
            )));
        }
    }
    Ok(())
}
