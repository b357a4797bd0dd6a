//! Recovery readiness scoring
//!
//! Scores how prepared a catalog is for a from-scratch recovery, 0 to 100.
//! The score is a weighted checklist: each factor carries a fixed weight and
//! a predicate over a [`ReadinessInputs`] snapshot; satisfied factors
//! contribute their full weight. Factor weights must sum to exactly 100 so
//! the score is always a percentage.

use crate::error::EngineError;
use opsvault_catalog::CatalogStats;
use serde::Serialize;

/// Pure snapshot of everything the scorer looks at. Taking a snapshot
/// decouples scoring from storage, so the same inputs always produce the
/// same score.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ReadinessInputs {
    /// Preserved script assets.
    pub script_count: u64,
    /// Scripts validated by a recovery run.
    pub tested_script_count: u64,
    /// Preserved configuration assets.
    pub config_count: u64,
    /// Preserved environment variables.
    pub env_var_count: u64,
    /// Phases in the persisted recovery plan.
    pub phase_count: u64,
    /// Whether the catalog schema opened and migrated cleanly.
    pub schema_ready: bool,
    /// Whether a dependency manifest is preserved.
    pub has_dependency_manifest: bool,
}

impl From<CatalogStats> for ReadinessInputs {
    fn from(stats: CatalogStats) -> Self {
        Self {
            script_count: stats.script_count,
            tested_script_count: stats.tested_script_count,
            config_count: stats.config_count,
            env_var_count: stats.env_var_count,
            phase_count: stats.phase_count,
            // Stats can only come from a catalog that opened and migrated.
            schema_ready: true,
            has_dependency_manifest: stats.has_dependency_manifest,
        }
    }
}

type Predicate = Box<dyn Fn(&ReadinessInputs) -> bool + Send + Sync>;

/// One weighted readiness factor.
pub struct Factor {
    name: &'static str,
    weight: u32,
    predicate: Predicate,
}

impl Factor {
    /// A named factor with its weight and predicate.
    #[must_use]
    pub fn new(
        name: &'static str,
        weight: u32,
        predicate: impl Fn(&ReadinessInputs) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self { name, weight, predicate: Box::new(predicate) }
    }
}

impl std::fmt::Debug for Factor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factor")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .finish_non_exhaustive()
    }
}

/// Evaluation of one factor against a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct FactorScore {
    /// Factor name.
    pub name: &'static str,
    /// Weight out of 100.
    pub weight: u32,
    /// Whether the predicate held.
    pub satisfied: bool,
}

/// Full scoring result.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreReport {
    /// Overall readiness, 0.0 to 100.0.
    pub score: f64,
    /// Per-factor breakdown, in declaration order.
    pub factors: Vec<FactorScore>,
}

impl ScoreReport {
    /// Names of unsatisfied factors, for operator guidance.
    #[must_use]
    pub fn gaps(&self) -> Vec<&'static str> {
        self.factors.iter().filter(|f| !f.satisfied).map(|f| f.name).collect()
    }
}

/// An ordered, weight-validated factor list.
#[derive(Debug)]
pub struct ScoreCard {
    factors: Vec<Factor>,
}

impl ScoreCard {
    /// Build a scorecard from factors.
    ///
    /// # Errors
    /// `InvalidWeights` unless the weights sum to exactly 100.
    pub fn new(factors: Vec<Factor>) -> Result<Self, EngineError> {
        let total: u32 = factors.iter().map(|f| f.weight).sum();
        if total != 100 {
            return Err(EngineError::InvalidWeights(total));
        }
        Ok(Self { factors })
    }

    /// The standard readiness factors.
    #[must_use]
    pub fn standard() -> Self {
        // Weights sum to 100 by construction.
        Self {
            factors: vec![
                // Scripts only count once a recovery run has validated them.
                Factor::new("scripts_preserved", 35, |i| i.tested_script_count > 0),
                Factor::new("configurations_preserved", 20, |i| i.config_count > 0),
                Factor::new("environment_captured", 15, |i| i.env_var_count > 0),
                Factor::new("orchestration_defined", 15, |i| i.phase_count > 0),
                Factor::new("schema_versioned", 10, |i| i.schema_ready),
                Factor::new("dependencies_manifest", 5, |i| i.has_dependency_manifest),
            ],
        }
    }

    /// Score a snapshot.
    #[must_use]
    pub fn score(&self, inputs: &ReadinessInputs) -> ScoreReport {
        let mut factors = Vec::with_capacity(self.factors.len());
        let mut total: u32 = 0;
        for factor in &self.factors {
            let satisfied = (factor.predicate)(inputs);
            if satisfied {
                total += factor.weight;
            }
            factors.push(FactorScore { name: factor.name, weight: factor.weight, satisfied });
        }
        tracing::debug!(score = total, "readiness scored");
        ScoreReport { score: f64::from(total), factors }
    }
}

impl Default for ScoreCard {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_inputs() -> ReadinessInputs {
        ReadinessInputs {
            script_count: 5,
            tested_script_count: 5,
            config_count: 2,
            env_var_count: 3,
            phase_count: 7,
            schema_ready: true,
            has_dependency_manifest: true,
        }
    }

    #[test]
    fn empty_catalog_scores_schema_only() {
        let report = ScoreCard::standard().score(&ReadinessInputs {
            schema_ready: true,
            ..Default::default()
        });
        assert_eq!(report.score, 10.0);
        assert_eq!(report.gaps().len(), 5);
    }

    #[test]
    fn full_catalog_scores_one_hundred() {
        let report = ScoreCard::standard().score(&full_inputs());
        assert_eq!(report.score, 100.0);
        assert!(report.gaps().is_empty());
    }

    #[test]
    fn missing_manifest_scores_ninety_five() {
        let inputs = ReadinessInputs { has_dependency_manifest: false, ..full_inputs() };
        let report = ScoreCard::standard().score(&inputs);
        assert_eq!(report.score, 95.0);
        assert_eq!(report.gaps(), vec!["dependencies_manifest"]);
    }

    #[test]
    fn score_is_monotone_in_satisfied_factors() {
        let card = ScoreCard::standard();
        let mut inputs = ReadinessInputs::default();
        let mut last = card.score(&inputs).score;

        inputs.schema_ready = true;
        let s = card.score(&inputs).score;
        assert!(s >= last);
        last = s;

        inputs.script_count = 1;
        inputs.tested_script_count = 1;
        let s = card.score(&inputs).score;
        assert!(s >= last);
        last = s;

        inputs.config_count = 1;
        assert!(card.score(&inputs).score >= last);
    }

    #[test]
    fn rejects_weights_not_summing_to_one_hundred() {
        let err = ScoreCard::new(vec![
            Factor::new("a", 60, |_| true),
            Factor::new("b", 60, |_| true),
        ])
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidWeights(120)));
    }

    #[test]
    fn custom_factors_are_evaluated_in_order() {
        let card = ScoreCard::new(vec![
            Factor::new("tested", 50, |i| i.tested_script_count == i.script_count),
            Factor::new("any", 50, |i| i.script_count > 0),
        ])
        .unwrap();
        let report = card.score(&ReadinessInputs {
            script_count: 2,
            tested_script_count: 1,
            ..Default::default()
        });
        assert_eq!(report.score, 50.0);
        assert_eq!(report.factors[0].name, "tested");
        assert!(!report.factors[0].satisfied);
    }

    #[test]
    fn stats_snapshot_marks_schema_ready() {
        let inputs = ReadinessInputs::from(opsvault_catalog::CatalogStats::default());
        assert!(inputs.schema_ready);
        assert_eq!(inputs.script_count, 0);
    }
}
