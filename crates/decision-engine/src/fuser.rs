use analysis_core::{
    AnalysisError, ConfidenceTier, Decision, DecisionRule, ModelState, ProbabilityEstimate,
    Signal, StrategyScore, TradeDirection, TrapAssessment,
};
use serde::{Deserialize, Serialize};

/// Cut-offs for the fusion rules. Defaults are tunable starting points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionThresholds {
    /// Trap risk at or above which nothing is traded
    pub trap_veto: f64,
    pub strong_score: f64,
    pub strong_probability: f64,
    /// Trap risk must stay below this for a strong setup
    pub strong_trap: f64,
    pub marginal_score: f64,
    pub marginal_probability: f64,
    pub marginal_trap: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            trap_veto: 50.0,
            strong_score: 70.0,
            strong_probability: 0.60,
            strong_trap: 25.0,
            marginal_score: 55.0,
            marginal_probability: 0.55,
            marginal_trap: 40.0,
        }
    }
}

impl DecisionThresholds {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        for (name, p) in [
            ("strong_probability", self.strong_probability),
            ("marginal_probability", self.marginal_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(AnalysisError::InvalidConfig(format!(
                    "{name} = {p} must be within [0, 1]"
                )));
            }
        }
        for (name, v) in [
            ("trap_veto", self.trap_veto),
            ("strong_score", self.strong_score),
            ("strong_trap", self.strong_trap),
            ("marginal_score", self.marginal_score),
            ("marginal_trap", self.marginal_trap),
        ] {
            if !(0.0..=100.0).contains(&v) {
                return Err(AnalysisError::InvalidConfig(format!(
                    "{name} = {v} must be within [0, 100]"
                )));
            }
        }
        if self.strong_score < self.marginal_score
            || self.strong_probability < self.marginal_probability
            || self.strong_trap > self.marginal_trap
        {
            return Err(AnalysisError::InvalidConfig(
                "strong setup thresholds must be at least as strict as marginal ones".to_string(),
            ));
        }
        if self.marginal_trap > self.trap_veto {
            return Err(AnalysisError::InvalidConfig(
                "marginal_trap must not exceed trap_veto".to_string(),
            ));
        }
        Ok(())
    }
}

fn signal_for(direction: TradeDirection) -> Signal {
    match direction {
        TradeDirection::Call => Signal::Buy,
        TradeDirection::Put => Signal::Sell,
    }
}

/// Combine score, probability and trap assessment into one decision.
///
/// Rules are tried in priority order and the first match wins. Without a
/// probability, or without a trend direction, the two trade rules cannot match.
pub fn fuse(
    score: &StrategyScore,
    estimate: &ProbabilityEstimate,
    traps: &TrapAssessment,
    thresholds: &DecisionThresholds,
) -> Decision {
    let t = thresholds;
    let trap_risk = traps.risk_score;
    let direction = TradeDirection::from_trend(score.trend);
    let probability = estimate
        .win_probability
        .filter(|_| estimate.model_state.produces_probability());

    let mut rationale = vec![format!(
        "Strategy score {:.1} ({})",
        score.final_score,
        score.grade.to_label()
    )];
    match probability {
        Some(p) => rationale.push(format!(
            "Win probability {:.0}% from a {} model on {} trades",
            p * 100.0,
            estimate.model_state,
            estimate.sample_size_used
        )),
        None => rationale.push(format!(
            "No win probability yet ({} closed trades, model {})",
            estimate.sample_size_used, estimate.model_state
        )),
    }
    rationale.push(format!("Trap risk {trap_risk:.0}/100"));

    let mut warnings = traps.warnings.clone();
    if probability.is_some() && estimate.model_state == ModelState::Learning {
        warnings.push("Model is still learning; probability is low-confidence".to_string());
    }

    let tradable = |min_score: f64, min_p: f64, max_trap: f64| -> Option<TradeDirection> {
        let p = probability?;
        let d = direction?;
        (score.final_score >= min_score && p >= min_p && trap_risk < max_trap).then_some(d)
    };

    let (signal, chosen, confidence, rule) = if trap_risk >= t.trap_veto {
        rationale.push(format!(
            "Trap risk {:.0} is at or above the veto level {:.0}",
            trap_risk, t.trap_veto
        ));
        (Signal::DoNotTrade, None, ConfidenceTier::High, DecisionRule::TrapVeto)
    } else if let Some(d) = tradable(t.strong_score, t.strong_probability, t.strong_trap) {
        rationale.push(format!(
            "Strong setup: score >= {:.0}, probability >= {:.0}%, trap risk < {:.0}",
            t.strong_score,
            t.strong_probability * 100.0,
            t.strong_trap
        ));
        (signal_for(d), Some(d), ConfidenceTier::High, DecisionRule::StrongSetup)
    } else if let Some(d) = tradable(t.marginal_score, t.marginal_probability, t.marginal_trap) {
        rationale.push(format!(
            "Marginal setup: score >= {:.0}, probability >= {:.0}%, trap risk < {:.0}",
            t.marginal_score,
            t.marginal_probability * 100.0,
            t.marginal_trap
        ));
        warnings.push("Marginal setup: consider a reduced position".to_string());
        (signal_for(d), Some(d), ConfidenceTier::Low, DecisionRule::MarginalSetup)
    } else if score.final_score < t.marginal_score {
        rationale.push(format!(
            "Score below {:.0}; wait for a better setup",
            t.marginal_score
        ));
        (Signal::Wait, None, ConfidenceTier::Medium, DecisionRule::WeakScore)
    } else {
        let reason = if probability.is_none() {
            "no trusted win probability"
        } else if direction.is_none() {
            "no trend direction"
        } else {
            "probability or trap risk outside the trade bands"
        };
        rationale.push(format!("Setup not confirmed: {reason}"));
        (Signal::DoNotTrade, None, ConfidenceTier::Low, DecisionRule::Fallback)
    };

    tracing::debug!(
        signal = signal.to_label(),
        rule = ?rule,
        score = score.final_score,
        probability = ?probability,
        trap_risk,
        "decision fused"
    );

    Decision {
        signal,
        direction: chosen,
        confidence,
        rule,
        score: score.final_score,
        grade: score.grade,
        win_probability: probability,
        model_state: estimate.model_state,
        trap_risk,
        rationale,
        warnings,
    }
}
