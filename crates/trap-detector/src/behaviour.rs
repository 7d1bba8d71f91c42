use std::collections::BTreeMap;

use analysis_core::{AnalysisError, TradeActivity, TradeOutcome};
use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Closed trades needed before loss-recovery rates are reported.
const MIN_RECOVERY_HISTORY: usize = 10;

/// Longest losing streak tracked for recovery rates.
const MAX_TRACKED_STREAK: usize = 3;

/// Limits for the trader-behaviour review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviourThresholds {
    /// Entries per UTC day before a pause is recommended
    pub max_daily_trades: usize,
    /// Losing streak length that triggers a pause
    pub max_consecutive_losses: usize,
    /// Revenge entries in the reviewed history that trigger a pause
    pub revenge_pause_instances: usize,
    /// An entry this soon after a losing close counts as a revenge entry
    pub revenge_window_secs: i64,
    /// Entries scored below this count against score discipline
    pub min_entry_score: f64,
    /// Discipline score below this raises a warning
    pub low_discipline: f64,
    /// Samples an hour or a streak length needs before it is reported
    pub min_samples: usize,
}

impl Default for BehaviourThresholds {
    fn default() -> Self {
        Self {
            max_daily_trades: 10,
            max_consecutive_losses: 3,
            revenge_pause_instances: 3,
            revenge_window_secs: 300,
            min_entry_score: 60.0,
            low_discipline: 60.0,
            min_samples: 5,
        }
    }
}

impl BehaviourThresholds {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.max_daily_trades == 0
            || self.max_consecutive_losses == 0
            || self.revenge_pause_instances == 0
            || self.min_samples == 0
        {
            return Err(AnalysisError::InvalidConfig(
                "behaviour limits must be positive".to_string(),
            ));
        }
        if self.revenge_window_secs < 0 {
            return Err(AnalysisError::InvalidConfig(
                "revenge_window_secs must not be negative".to_string(),
            ));
        }
        for (name, v) in [
            ("min_entry_score", self.min_entry_score),
            ("low_discipline", self.low_discipline),
        ] {
            if !(0.0..=100.0).contains(&v) {
                return Err(AnalysisError::InvalidConfig(format!(
                    "{name} = {v} must be within [0, 100]"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DisciplineGrade {
    A,
    B,
    C,
    D,
    F,
}

impl DisciplineGrade {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            DisciplineGrade::A
        } else if score >= 80.0 {
            DisciplineGrade::B
        } else if score >= 70.0 {
            DisciplineGrade::C
        } else if score >= 60.0 {
            DisciplineGrade::D
        } else {
            DisciplineGrade::F
        }
    }
}

/// How closely recent entries followed the trading rules (0-100 each).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisciplineScore {
    pub score: f64,
    pub grade: DisciplineGrade,
    /// Fewer entries taken while a trap flag was up scores higher
    pub rule_adherence: f64,
    /// Share of entries with a journal note
    pub journal_compliance: f64,
    /// Share of entries scored at or above the minimum entry score
    pub score_discipline: f64,
}

impl Default for DisciplineScore {
    fn default() -> Self {
        Self {
            score: 100.0,
            grade: DisciplineGrade::A,
            rule_adherence: 100.0,
            journal_compliance: 100.0,
            score_discipline: 100.0,
        }
    }
}

/// Win rate of the trade taken right after a losing streak of `after_losses`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossRecovery {
    pub after_losses: usize,
    pub win_rate: f64,
    pub sample_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPerformance {
    /// UTC hour the trades were opened in
    pub hour: u32,
    pub trades: usize,
    pub win_rate: f64,
}

/// Review of the trader's own recent behaviour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviourAssessment {
    pub discipline: DisciplineScore,
    pub trades_today: usize,
    pub consecutive_losses: usize,
    pub revenge_instances: usize,
    pub loss_recovery: Vec<LossRecovery>,
    /// Hours with enough closed trades, best win rate first
    pub hourly: Vec<HourlyPerformance>,
    pub pause_trading: bool,
    pub pause_reason: Option<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

fn share(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Discipline, streak and timing review over recent trade activity.
#[derive(Debug, Clone, Default)]
pub struct BehaviourAnalyzer {
    thresholds: BehaviourThresholds,
}

impl BehaviourAnalyzer {
    pub fn new(thresholds: BehaviourThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &BehaviourThresholds {
        &self.thresholds
    }

    /// Review `activity` as of `now`. Entries after `now` are ignored.
    pub fn assess(&self, activity: &[TradeActivity], now: DateTime<Utc>) -> BehaviourAssessment {
        let t = &self.thresholds;

        let mut entries: Vec<&TradeActivity> =
            activity.iter().filter(|a| a.opened_at <= now).collect();
        entries.sort_by_key(|a| a.opened_at);

        let mut closed: Vec<(DateTime<Utc>, &TradeActivity)> = entries
            .iter()
            .filter_map(|a| a.closed_at.filter(|c| *c <= now).map(|c| (c, *a)))
            .collect();
        closed.sort_by_key(|(c, _)| *c);
        let closed: Vec<&TradeActivity> = closed.into_iter().map(|(_, a)| a).collect();

        let mut out = BehaviourAssessment {
            discipline: self.discipline(&entries),
            trades_today: entries
                .iter()
                .filter(|a| a.opened_at.date_naive() == now.date_naive())
                .count(),
            consecutive_losses: closed
                .iter()
                .rev()
                .take_while(|a| a.outcome == TradeOutcome::Loss)
                .count(),
            revenge_instances: self.revenge_instances(&entries),
            loss_recovery: self.loss_recovery(&closed),
            hourly: self.hourly(&closed),
            ..BehaviourAssessment::default()
        };

        out.pause_reason = if out.trades_today >= t.max_daily_trades {
            Some(format!(
                "daily limit of {} trades reached",
                t.max_daily_trades
            ))
        } else if out.revenge_instances >= t.revenge_pause_instances {
            Some(format!(
                "{} entries taken within {}s of a loss",
                out.revenge_instances, t.revenge_window_secs
            ))
        } else if out.consecutive_losses >= t.max_consecutive_losses {
            Some(format!("{} consecutive losses", out.consecutive_losses))
        } else {
            None
        };
        out.pause_trading = out.pause_reason.is_some();

        self.write_warnings(&mut out);
        self.write_recommendations(&mut out);

        if out.pause_trading {
            tracing::debug!(
                reason = out.pause_reason.as_deref().unwrap_or_default(),
                discipline = out.discipline.score,
                "trading pause recommended"
            );
        }

        out
    }

    fn discipline(&self, entries: &[&TradeActivity]) -> DisciplineScore {
        if entries.is_empty() {
            return DisciplineScore::default();
        }
        let total = entries.len();
        let violations = entries.iter().filter(|a| a.entry_trap_risk > 0.0).count();
        let journaled = entries.iter().filter(|a| a.journaled).count();
        let well_scored = entries
            .iter()
            .filter(|a| a.entry_score >= self.thresholds.min_entry_score)
            .count();

        let rule_adherence = (100.0 - violations as f64 / total as f64 * 50.0).max(0.0);
        let journal_compliance = share(journaled, total);
        let score_discipline = share(well_scored, total);
        let score = 0.4 * rule_adherence + 0.3 * journal_compliance + 0.3 * score_discipline;

        DisciplineScore {
            score,
            grade: DisciplineGrade::from_score(score),
            rule_adherence,
            journal_compliance,
            score_discipline,
        }
    }

    /// Entries opened inside the window after the previous entry closed as a loss.
    fn revenge_instances(&self, entries: &[&TradeActivity]) -> usize {
        let window = Duration::seconds(self.thresholds.revenge_window_secs);
        entries
            .windows(2)
            .filter(|pair| {
                let (prev, curr) = (pair[0], pair[1]);
                match prev.closed_at {
                    Some(closed_at) if prev.outcome == TradeOutcome::Loss => {
                        curr.opened_at >= closed_at && curr.opened_at - closed_at < window
                    }
                    _ => false,
                }
            })
            .count()
    }

    fn loss_recovery(&self, closed: &[&TradeActivity]) -> Vec<LossRecovery> {
        if closed.len() < MIN_RECOVERY_HISTORY {
            return Vec::new();
        }

        // (wins, trades) for the trade following a streak of i + 1 losses
        let mut after = [(0usize, 0usize); MAX_TRACKED_STREAK];
        let mut streak = 0usize;
        for a in closed {
            if (1..=MAX_TRACKED_STREAK).contains(&streak) {
                let slot = &mut after[streak - 1];
                slot.1 += 1;
                if a.outcome == TradeOutcome::Win {
                    slot.0 += 1;
                }
            }
            streak = if a.outcome == TradeOutcome::Loss { streak + 1 } else { 0 };
        }

        after
            .iter()
            .enumerate()
            .filter(|(_, (_, n))| *n > 0)
            .map(|(i, (wins, n))| LossRecovery {
                after_losses: i + 1,
                win_rate: share(*wins, *n),
                sample_size: *n,
            })
            .collect()
    }

    fn hourly(&self, closed: &[&TradeActivity]) -> Vec<HourlyPerformance> {
        let mut by_hour: BTreeMap<u32, (usize, usize)> = BTreeMap::new();
        for a in closed {
            let slot = by_hour.entry(a.opened_at.hour()).or_default();
            slot.1 += 1;
            if a.outcome == TradeOutcome::Win {
                slot.0 += 1;
            }
        }

        let mut hours: Vec<HourlyPerformance> = by_hour
            .into_iter()
            .filter(|(_, (_, n))| *n >= self.thresholds.min_samples)
            .map(|(hour, (wins, n))| HourlyPerformance {
                hour,
                trades: n,
                win_rate: share(wins, n),
            })
            .collect();
        hours.sort_by(|a, b| b.win_rate.total_cmp(&a.win_rate).then(a.hour.cmp(&b.hour)));
        hours
    }

    fn write_warnings(&self, out: &mut BehaviourAssessment) {
        let t = &self.thresholds;
        if out.trades_today >= t.max_daily_trades {
            out.warnings.push(format!(
                "Daily limit reached: {} trades today (limit {})",
                out.trades_today, t.max_daily_trades
            ));
        }
        if out.revenge_instances > 0 {
            out.warnings.push(format!(
                "Revenge trading pattern: {} entries within {}s of a loss",
                out.revenge_instances, t.revenge_window_secs
            ));
        }
        if out.discipline.score < t.low_discipline {
            out.warnings.push(format!(
                "Low discipline score {:.0}/100 (grade {:?}): \
                 follow the rules and journal every trade",
                out.discipline.score, out.discipline.grade
            ));
        }
        if let Some(reason) = &out.pause_reason {
            out.warnings
                .push(format!("Trading pause recommended: {reason}"));
        }
    }

    fn write_recommendations(&self, out: &mut BehaviourAssessment) {
        let t = &self.thresholds;
        if let Some(best) = out.hourly.first() {
            out.recommendations.push(format!(
                "Best hour is {:02}:00 UTC ({:.0}% win rate over {} trades)",
                best.hour, best.win_rate, best.trades
            ));
        }
        if let Some(worst) = out.hourly.last().filter(|h| h.win_rate < 40.0) {
            out.recommendations.push(format!(
                "Avoid {:02}:00 UTC ({:.0}% win rate)",
                worst.hour, worst.win_rate
            ));
        }
        for r in &out.loss_recovery {
            if r.win_rate < 40.0 && r.sample_size >= t.min_samples {
                out.recommendations.push(format!(
                    "Win rate drops to {:.0}% after {} consecutive losses; \
                     stop after losing streaks",
                    r.win_rate, r.after_losses
                ));
            }
        }
        if out.discipline.journal_compliance < 50.0 {
            out.recommendations.push(format!(
                "Only {:.0}% of trades have journal notes; record the reason for each entry",
                out.discipline.journal_compliance
            ));
        }
    }
}
