//! CARI (Crypto-Agility Readiness Index) scoring engine
//!
//! Applies a fixed weighted rubric to per-criterion maturity scores and
//! reduces them into a composite index in [0, 1], with the per-criterion
//! contributions kept so reports can show what drove a profile's score.
//! Rubric and score validation is strict: a malformed rubric or an
//! out-of-range score is a caller mistake and is surfaced immediately,
//! never coerced.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Tolerance on the rubric weight sum
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// One rubric criterion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Criterion {
    pub id: String,
    /// Human-facing label carried through to reports
    pub label: String,
    /// Relative weight in [0, 1]; all weights in a rubric sum to 1.0
    pub weight: f64,
}

impl Criterion {
    pub fn new<S: Into<String>, L: Into<String>>(id: S, label: L, weight: f64) -> Self {
        Criterion {
            id: id.into(),
            label: label.into(),
            weight,
        }
    }
}

/// A validated, immutable set of weighted criteria.
///
/// Passed explicitly through evaluation calls; there is deliberately no
/// process-wide rubric singleton.
#[derive(Debug, Clone, Serialize)]
pub struct Rubric {
    criteria: Vec<Criterion>,
}

impl Rubric {
    /// Validate and build a rubric: weights non-negative and summing to
    /// 1.0 ± 1e-6, criterion ids unique.
    pub fn new(criteria: Vec<Criterion>) -> Result<Self> {
        if criteria.is_empty() {
            return Err(Error::validation("rubric has no criteria"));
        }

        let mut seen = HashSet::new();
        let mut sum = 0.0;
        for criterion in &criteria {
            if criterion.weight < 0.0 {
                return Err(Error::validation(format!(
                    "criterion '{}' has negative weight {}",
                    criterion.id, criterion.weight
                )));
            }
            if !seen.insert(criterion.id.as_str()) {
                return Err(Error::validation(format!(
                    "duplicate criterion id '{}'",
                    criterion.id
                )));
            }
            sum += criterion.weight;
        }

        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(Error::validation(format!(
                "rubric weights sum to {}, expected 1.0",
                sum
            )));
        }

        Ok(Rubric { criteria })
    }

    /// The ten-criterion rubric derived from the ANSSI 2023-2024 survey of
    /// French software vendors. Weights are the survey's published shares.
    pub fn anssi_2024() -> Rubric {
        // Weights sum to exactly 1.0; construction bypasses re-validation.
        Rubric {
            criteria: vec![
                Criterion::new("hybridization-standards", "Availability of hybridization standards", 0.12),
                Criterion::new("standardized-hybrid-schemes", "Standardization of deployed hybrid schemes", 0.10),
                Criterion::new("reference-libraries", "Maturity of reference libraries", 0.10),
                Criterion::new("regulatory-guidance", "Currency of regulatory guidance", 0.08),
                Criterion::new("hardware-support", "Hardware equipment compatibility", 0.08),
                Criterion::new("signature-performance", "Signature performance readiness", 0.05),
                Criterion::new("transition-plan", "Existence of a transition plan", 0.15),
                Criterion::new("library-certification", "Certification of cryptographic libraries", 0.12),
                Criterion::new("staff-awareness", "Staff awareness of the quantum threat", 0.10),
                Criterion::new("skills-investment", "Investment in skills development", 0.10),
            ],
        }
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// Score one profile against this rubric.
    ///
    /// `raw_scores` must cover exactly the rubric's criterion set: a missing
    /// criterion is not defaulted to zero (that would misrepresent
    /// maturity), and an id the rubric does not define is rejected.
    pub fn evaluate(
        &self,
        profile_name: &str,
        raw_scores: &BTreeMap<String, f64>,
    ) -> Result<ProfileEvaluation> {
        for id in raw_scores.keys() {
            if !self.criteria.iter().any(|c| &c.id == id) {
                return Err(Error::validation(format!(
                    "profile '{}' scores unknown criterion '{}'",
                    profile_name, id
                )));
            }
        }

        let mut scores = BTreeMap::new();
        let mut composite_index = 0.0;
        for criterion in &self.criteria {
            let raw = *raw_scores.get(&criterion.id).ok_or_else(|| {
                Error::validation(format!(
                    "profile '{}' is missing a score for criterion '{}'",
                    profile_name, criterion.id
                ))
            })?;
            if !(0.0..=1.0).contains(&raw) {
                return Err(Error::validation(format!(
                    "profile '{}' scores criterion '{}' at {}, outside [0, 1]",
                    profile_name, criterion.id, raw
                )));
            }
            let contribution = raw * criterion.weight;
            composite_index += contribution;
            scores.insert(
                criterion.id.clone(),
                CriterionScore {
                    criterion_id: criterion.id.clone(),
                    raw_score: raw,
                    weight: criterion.weight,
                    contribution,
                },
            );
        }

        Ok(ProfileEvaluation {
            profile_name: profile_name.to_string(),
            scores,
            composite_index,
        })
    }
}

/// One criterion's scored contribution to a profile
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriterionScore {
    pub criterion_id: String,
    pub raw_score: f64,
    pub weight: f64,
    /// raw_score × weight
    pub contribution: f64,
}

/// A profile scored against a rubric
#[derive(Debug, Clone, Serialize)]
pub struct ProfileEvaluation {
    pub profile_name: String,
    pub scores: BTreeMap<String, CriterionScore>,
    /// Σ(raw_score × weight) over all criteria, in [0, 1]
    pub composite_index: f64,
}

impl ProfileEvaluation {
    pub fn readiness(&self) -> ReadinessLevel {
        ReadinessLevel::from_index(self.composite_index)
    }
}

/// Interpretation bands for a composite index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadinessLevel {
    Excellent,
    Good,
    Moderate,
    Low,
    AtRisk,
}

impl ReadinessLevel {
    pub fn from_index(index: f64) -> Self {
        if index >= 0.90 {
            ReadinessLevel::Excellent
        } else if index >= 0.80 {
            ReadinessLevel::Good
        } else if index >= 0.70 {
            ReadinessLevel::Moderate
        } else if index >= 0.60 {
            ReadinessLevel::Low
        } else {
            ReadinessLevel::AtRisk
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ReadinessLevel::Excellent => "ready for the post-quantum transition",
            ReadinessLevel::Good => "a few blockers left to clear",
            ReadinessLevel::Moderate => "preparation still required",
            ReadinessLevel::Low => "significant effort required",
            ReadinessLevel::AtRisk => "transition at risk",
        }
    }
}

/// Rank evaluations by composite index, best first.
///
/// Ties break on profile name so the ordering is stable across runs.
pub fn compare_profiles(mut evaluations: Vec<ProfileEvaluation>) -> Vec<ProfileEvaluation> {
    evaluations.sort_by(|a, b| {
        b.composite_index
            .partial_cmp(&a.composite_index)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.profile_name.cmp(&b.profile_name))
    });
    evaluations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores_for(rubric: &Rubric, value: f64) -> BTreeMap<String, f64> {
        rubric
            .criteria()
            .iter()
            .map(|c| (c.id.clone(), value))
            .collect()
    }

    #[test]
    fn test_rubric_rejects_bad_weight_sum() {
        let err = Rubric::new(vec![
            Criterion::new("a", "A", 0.5),
            Criterion::new("b", "B", 0.4),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_rubric_accepts_sum_within_tolerance() {
        let rubric = Rubric::new(vec![
            Criterion::new("a", "A", 0.3333333),
            Criterion::new("b", "B", 0.3333333),
            Criterion::new("c", "C", 0.3333334),
        ]);
        assert!(rubric.is_ok());
    }

    #[test]
    fn test_rubric_rejects_negative_weight() {
        let err = Rubric::new(vec![
            Criterion::new("a", "A", 1.2),
            Criterion::new("b", "B", -0.2),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_rubric_rejects_duplicate_ids() {
        let err = Rubric::new(vec![
            Criterion::new("a", "A", 0.5),
            Criterion::new("a", "A again", 0.5),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_anssi_rubric_is_valid() {
        let rubric = Rubric::anssi_2024();
        assert_eq!(rubric.len(), 10);
        let sum: f64 = rubric.criteria().iter().map(|c| c.weight).sum();
        assert!((sum - 1.0).abs() <= WEIGHT_SUM_TOLERANCE);
        // Round-trips through the validating constructor.
        assert!(Rubric::new(rubric.criteria().to_vec()).is_ok());
    }

    #[test]
    fn test_perfect_scores_give_composite_one() {
        let rubric = Rubric::anssi_2024();
        let eval = rubric
            .evaluate("specialists", &scores_for(&rubric, 1.0))
            .unwrap();
        assert!((eval.composite_index - 1.0).abs() < 1e-12);
        assert_eq!(eval.readiness(), ReadinessLevel::Excellent);
    }

    #[test]
    fn test_composite_is_weighted_sum() {
        let rubric = Rubric::new(vec![
            Criterion::new("a", "A", 0.25),
            Criterion::new("b", "B", 0.75),
        ])
        .unwrap();
        let mut raw = BTreeMap::new();
        raw.insert("a".to_string(), 0.4);
        raw.insert("b".to_string(), 0.8);
        let eval = rubric.evaluate("p", &raw).unwrap();
        assert!((eval.composite_index - (0.4 * 0.25 + 0.8 * 0.75)).abs() < 1e-12);
        assert!((eval.scores["a"].contribution - 0.1).abs() < 1e-12);
        assert!((eval.scores["b"].contribution - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_unaware_profile_scores_low() {
        // The survey's "non-sensibilisés" cohort: weighted sum 0.676.
        let rubric = Rubric::anssi_2024();
        let raw: BTreeMap<String, f64> = [
            ("hybridization-standards", 0.55),
            ("standardized-hybrid-schemes", 0.70),
            ("reference-libraries", 0.70),
            ("regulatory-guidance", 0.70),
            ("hardware-support", 0.70),
            ("signature-performance", 0.70),
            ("transition-plan", 0.66),
            ("library-certification", 0.70),
            ("staff-awareness", 0.70),
            ("skills-investment", 0.70),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let eval = rubric.evaluate("non-sensibilises", &raw).unwrap();
        assert!((eval.composite_index - 0.676).abs() < 1e-9);
        assert_eq!(eval.readiness(), ReadinessLevel::Low);
    }

    #[test]
    fn test_evaluate_rejects_out_of_range_score() {
        let rubric = Rubric::anssi_2024();
        let mut raw = scores_for(&rubric, 0.5);
        raw.insert("transition-plan".to_string(), 1.2);
        let err = rubric.evaluate("p", &raw).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_evaluate_rejects_missing_criterion() {
        let rubric = Rubric::anssi_2024();
        let mut raw = scores_for(&rubric, 0.5);
        raw.remove("transition-plan");
        let err = rubric.evaluate("p", &raw).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_evaluate_rejects_unknown_criterion() {
        let rubric = Rubric::anssi_2024();
        let mut raw = scores_for(&rubric, 0.5);
        raw.insert("quantum-vibes".to_string(), 0.5);
        let err = rubric.evaluate("p", &raw).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_compare_profiles_ranks_descending() {
        let rubric = Rubric::anssi_2024();
        let evals = vec![
            rubric.evaluate("aware", &scores_for(&rubric, 0.6)).unwrap(),
            rubric
                .evaluate("specialists", &scores_for(&rubric, 0.95))
                .unwrap(),
            rubric.evaluate("unaware", &scores_for(&rubric, 0.3)).unwrap(),
        ];
        let ranked = compare_profiles(evals);
        let names: Vec<&str> = ranked.iter().map(|e| e.profile_name.as_str()).collect();
        assert_eq!(names, vec!["specialists", "aware", "unaware"]);
    }

    #[test]
    fn test_compare_profiles_breaks_ties_by_name() {
        let rubric = Rubric::anssi_2024();
        let evals = vec![
            rubric.evaluate("zeta", &scores_for(&rubric, 0.5)).unwrap(),
            rubric.evaluate("alpha", &scores_for(&rubric, 0.5)).unwrap(),
        ];
        let ranked = compare_profiles(evals);
        assert_eq!(ranked[0].profile_name, "alpha");
        assert_eq!(ranked[1].profile_name, "zeta");
    }

    #[test]
    fn test_readiness_bands() {
        assert_eq!(ReadinessLevel::from_index(0.95), ReadinessLevel::Excellent);
        assert_eq!(ReadinessLevel::from_index(0.85), ReadinessLevel::Good);
        assert_eq!(ReadinessLevel::from_index(0.75), ReadinessLevel::Moderate);
        assert_eq!(ReadinessLevel::from_index(0.65), ReadinessLevel::Low);
        assert_eq!(ReadinessLevel::from_index(0.30), ReadinessLevel::AtRisk);
    }
}
