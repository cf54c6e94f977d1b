//! Configuration module
//!
//! One YAML file drives both the benchmark campaigns and the CARI profile
//! evaluation. Keys follow the usual kebab-case convention; everything has a
//! workable default except the campaign list and the profiles themselves.

use crate::campaign::{CampaignConfig, DEFAULT_FAILURE_THRESHOLD};
use crate::cari::{Criterion, Rubric};
use crate::driver::DriverConfig;
use crate::stats::DEFAULT_ALPHA;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Target TLS 1.3 endpoint as host:port
    pub target: String,

    /// Server name for SNI (defaults to the target host)
    pub sni: Option<String>,

    /// Accept any server certificate (lab endpoints)
    #[serde(rename = "skip-cert-verify")]
    pub skip_cert_verify: bool,

    /// Extra PEM trust anchors for endpoints behind a private CA
    #[serde(rename = "ca-certificate")]
    pub ca_certificate: Option<PathBuf>,

    /// Abort a configuration once its failure rate exceeds this fraction
    #[serde(rename = "failure-threshold")]
    pub failure_threshold: f64,

    /// Significance level for the latency comparison
    pub alpha: f64,

    /// Group the others are compared against; defaults to the first campaign
    #[serde(rename = "baseline-group")]
    pub baseline_group: Option<String>,

    /// Pause between trials, milliseconds (0 = none)
    #[serde(rename = "trial-pause-ms")]
    pub trial_pause_ms: u64,

    /// Pause between configurations, milliseconds
    #[serde(rename = "config-pause-ms")]
    pub config_pause_ms: u64,

    /// Benchmark campaigns, one per key-exchange group
    #[serde(default)]
    pub campaigns: Vec<CampaignEntry>,

    /// Custom rubric; omitted means the built-in ANSSI 2023-2024 rubric
    pub rubric: Option<Vec<CriterionEntry>>,

    /// Profile name -> criterion id -> raw score in [0, 1]
    #[serde(default)]
    pub profiles: BTreeMap<String, BTreeMap<String, f64>>,

    /// Where JSON/CSV results land
    #[serde(rename = "output-dir")]
    pub output_dir: PathBuf,

    /// Log level
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

/// One benchmark campaign configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignEntry {
    /// Key-exchange group to pin
    pub group: String,

    /// Optional configuration label (defaults to the group name)
    pub label: Option<String>,

    /// Measured trials
    #[serde(default = "default_iterations")]
    pub iterations: usize,

    /// Discarded warm-up trials
    #[serde(default = "default_warmup")]
    pub warmup: usize,

    /// Per-trial timeout in seconds
    #[serde(default = "default_timeout_secs", rename = "timeout-secs")]
    pub timeout_secs: u64,
}

/// One rubric criterion as configured
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriterionEntry {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    pub weight: f64,
}

fn default_iterations() -> usize {
    1000
}

fn default_warmup() -> usize {
    50
}

fn default_timeout_secs() -> u64 {
    5
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load from string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.failure_threshold) {
            return Err(Error::config(format!(
                "failure-threshold must be in [0, 1), got {}",
                self.failure_threshold
            )));
        }
        if !(0.0..1.0).contains(&self.alpha) || self.alpha == 0.0 {
            return Err(Error::config(format!(
                "alpha must be in (0, 1), got {}",
                self.alpha
            )));
        }
        for entry in &self.campaigns {
            if entry.iterations == 0 {
                return Err(Error::config(format!(
                    "campaign for group {} has zero iterations",
                    entry.group
                )));
            }
            if entry.timeout_secs == 0 {
                return Err(Error::config(format!(
                    "campaign for group {} has zero timeout",
                    entry.group
                )));
            }
        }
        if let Some(baseline) = &self.baseline_group {
            if !self.campaigns.iter().any(|c| &c.group == baseline) {
                return Err(Error::config(format!(
                    "baseline-group {} has no campaign entry",
                    baseline
                )));
            }
        }
        Ok(())
    }

    /// Driver view of this configuration
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            target: self.target.clone(),
            sni: self.sni.clone(),
            groups: self.campaigns.iter().map(|c| c.group.clone()).collect(),
            ca_certificate: self.ca_certificate.clone(),
            skip_cert_verify: self.skip_cert_verify,
        }
    }

    /// Controller view of the campaign list
    pub fn campaign_configs(&self) -> Vec<CampaignConfig> {
        self.campaigns
            .iter()
            .map(|entry| CampaignConfig {
                group: entry.group.clone(),
                label: entry.label.clone(),
                iterations: entry.iterations,
                warmup: entry.warmup,
                timeout: Duration::from_secs(entry.timeout_secs),
            })
            .collect()
    }

    /// Group the comparison baselines against
    pub fn baseline_group(&self) -> Option<&str> {
        self.baseline_group
            .as_deref()
            .or_else(|| self.campaigns.first().map(|c| c.group.as_str()))
    }

    /// The configured rubric, or the built-in ANSSI one
    pub fn rubric(&self) -> Result<Rubric> {
        match &self.rubric {
            None => Ok(Rubric::anssi_2024()),
            Some(entries) => Rubric::new(
                entries
                    .iter()
                    .map(|e| {
                        Criterion::new(
                            e.id.clone(),
                            e.label.clone().unwrap_or_else(|| e.id.clone()),
                            e.weight,
                        )
                    })
                    .collect(),
            ),
        }
    }

    pub fn trial_pause(&self) -> Option<Duration> {
        (self.trial_pause_ms > 0).then(|| Duration::from_millis(self.trial_pause_ms))
    }

    pub fn config_pause(&self) -> Option<Duration> {
        (self.config_pause_ms > 0).then(|| Duration::from_millis(self.config_pause_ms))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            target: "localhost:4433".to_string(),
            sni: None,
            skip_cert_verify: false,
            ca_certificate: None,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            alpha: DEFAULT_ALPHA,
            baseline_group: None,
            trial_pause_ms: 0,
            config_pause_ms: 2000,
            campaigns: Vec::new(),
            rubric: None,
            profiles: BTreeMap::new(),
            output_dir: PathBuf::from("data/output"),
            log_level: Some("info".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
target: "localhost:4433"
skip-cert-verify: true
baseline-group: X25519
campaigns:
  - group: X25519
    label: classic
    iterations: 1000
    warmup: 50
  - group: X25519MLKEM768
    label: hybrid
profiles:
  specialists:
    transition-plan: 0.9
"#;

    #[test]
    fn test_parse_sample_config() {
        let config = Config::from_str(SAMPLE).unwrap();
        assert_eq!(config.target, "localhost:4433");
        assert!(config.skip_cert_verify);
        assert_eq!(config.campaigns.len(), 2);
        assert_eq!(config.campaigns[0].label.as_deref(), Some("classic"));
        // Entry defaults apply where omitted.
        assert_eq!(config.campaigns[1].iterations, 1000);
        assert_eq!(config.campaigns[1].warmup, 50);
        assert_eq!(config.campaigns[1].timeout_secs, 5);
        assert_eq!(config.baseline_group(), Some("X25519"));
    }

    #[test]
    fn test_default_baseline_is_first_campaign() {
        let mut config = Config::from_str(SAMPLE).unwrap();
        config.baseline_group = None;
        assert_eq!(config.baseline_group(), Some("X25519"));
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = Config::from_str(SAMPLE).unwrap();
        config.failure_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_baseline() {
        let mut config = Config::from_str(SAMPLE).unwrap();
        config.baseline_group = Some("secp384r1".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_campaign_configs_carry_timeouts() {
        let config = Config::from_str(SAMPLE).unwrap();
        let campaigns = config.campaign_configs();
        assert_eq!(campaigns[0].timeout, Duration::from_secs(5));
        assert_eq!(campaigns[0].configuration_id(), "classic");
    }

    #[test]
    fn test_custom_rubric_is_validated() {
        let yaml = r#"
target: "localhost:4433"
rubric:
  - id: a
    weight: 0.6
  - id: b
    weight: 0.3
"#;
        let config = Config::from_str(yaml).unwrap();
        // Weights sum to 0.9: rejected when the rubric is materialized.
        assert!(config.rubric().is_err());
    }

    #[test]
    fn test_default_rubric_when_unset() {
        let config = Config::from_str("target: \"localhost:4433\"").unwrap();
        let rubric = config.rubric().unwrap();
        assert_eq!(rubric.len(), 10);
    }
}
