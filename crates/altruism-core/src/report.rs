//! Per-player aggregates over a session's scoring records.

use std::collections::BTreeMap;
use std::fmt;

use altruism_types::{AgentId, ScoringRecord};
use serde::{Deserialize, Serialize};

use crate::sink::RoundRecord;

/// Sum and count of one family metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricTotal {
    /// Sum of observed values.
    pub sum: f64,
    /// Rounds that reported the metric.
    pub count: u32,
}

impl MetricTotal {
    /// Mean of the observed values, if any were observed.
    pub fn mean(self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / f64::from(self.count))
    }
}

/// Running totals for one player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerReport {
    /// Rounds scored.
    pub rounds: u32,
    /// Rounds whose move was a substituted default.
    pub defaults: u32,
    /// Sum of altruism scores.
    pub altruism_sum: f64,
    /// Sum of friend benefit.
    pub benefit_sum: f64,
    /// Sum of friend harm.
    pub harm_sum: f64,
    /// Sum of the player's utility under its chosen actions.
    pub chosen_utility_sum: f64,
    /// Sum of the player's utility under its selfish baselines.
    pub selfish_utility_sum: f64,
    /// How often each action was chosen.
    pub actions: BTreeMap<String, u32>,
    /// Totals of the family metrics (`relative_harvest`, `sf_distance`, ...).
    pub metrics: BTreeMap<String, MetricTotal>,
}

impl PlayerReport {
    fn observe(&mut self, record: &ScoringRecord) {
        self.rounds = self.rounds.saturating_add(1);
        if record.provenance.is_default() {
            self.defaults = self.defaults.saturating_add(1);
        }
        self.altruism_sum += record.altruism_score;
        self.benefit_sum += record.friends_benefit_sum;
        self.harm_sum += record.friends_harm_sum;
        self.chosen_utility_sum += record.utility_chosen;
        self.selfish_utility_sum += record.utility_selfish;
        let count = self.actions.entry(record.chosen_action.clone()).or_insert(0);
        *count = count.saturating_add(1);
        for (name, value) in &record.metrics {
            if !value.is_finite() {
                continue;
            }
            let total = self.metrics.entry(name.clone()).or_default();
            total.sum += value;
            total.count = total.count.saturating_add(1);
        }
    }

    fn mean(&self, sum: f64) -> f64 {
        if self.rounds == 0 {
            0.0
        } else {
            sum / f64::from(self.rounds)
        }
    }

    /// Mean altruism score.
    pub fn mean_altruism(&self) -> f64 {
        self.mean(self.altruism_sum)
    }

    /// Mean friend benefit.
    pub fn mean_benefit(&self) -> f64 {
        self.mean(self.benefit_sum)
    }

    /// Mean friend harm.
    pub fn mean_harm(&self) -> f64 {
        self.mean(self.harm_sum)
    }

    /// Mean utility under the chosen action.
    pub fn mean_chosen_utility(&self) -> f64 {
        self.mean(self.chosen_utility_sum)
    }

    /// Mean utility under the selfish baseline.
    pub fn mean_selfish_utility(&self) -> f64 {
        self.mean(self.selfish_utility_sum)
    }

    /// Mean of a family metric over the rounds that reported it.
    pub fn metric_mean(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied().and_then(MetricTotal::mean)
    }

    /// Fraction of rounds whose move was a substituted default.
    pub fn default_rate(&self) -> f64 {
        self.mean(f64::from(self.defaults))
    }
}

/// Aggregates for every player of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    players: BTreeMap<AgentId, PlayerReport>,
}

impl SessionReport {
    /// An empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a report from stored records.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a RoundRecord>) -> Self {
        let mut report = Self::new();
        for r in records {
            report.observe(&r.agent, &r.record);
        }
        report
    }

    /// Fold one record into `agent`'s totals.
    pub fn observe(&mut self, agent: &AgentId, record: &ScoringRecord) {
        self.players
            .entry(agent.clone())
            .or_default()
            .observe(record);
    }

    /// Totals for `agent`.
    pub fn player(&self, agent: &AgentId) -> Option<&PlayerReport> {
        self.players.get(agent)
    }

    /// Every player's totals, in id order.
    pub const fn players(&self) -> &BTreeMap<AgentId, PlayerReport> {
        &self.players
    }

    /// Substituted defaults across all players.
    pub fn defaults(&self) -> u32 {
        self.players
            .values()
            .fold(0_u32, |acc, p| acc.saturating_add(p.defaults))
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<16} {:>6} {:>9} {:>9} {:>9} {:>9} {:>9} {:>8}",
            "player", "rounds", "altruism", "benefit", "harm", "chosen", "selfish", "defaults"
        )?;
        for (agent, p) in &self.players {
            writeln!(
                f,
                "{:<16} {:>6} {:>9.3} {:>9.3} {:>9.3} {:>9.3} {:>9.3} {:>7.0}%",
                agent.as_str(),
                p.rounds,
                p.mean_altruism(),
                p.mean_benefit(),
                p.mean_harm(),
                p.mean_chosen_utility(),
                p.mean_selfish_utility(),
                p.default_rate() * 100.0,
            )?;
            let actions: Vec<String> = p
                .actions
                .iter()
                .map(|(action, n)| format!("{action} x{n}"))
                .collect();
            writeln!(f, "{:<16} actions: {}", "", actions.join(", "))?;
            if !p.metrics.is_empty() {
                let metrics: Vec<String> = p
                    .metrics
                    .iter()
                    .filter_map(|(name, total)| Some(format!("{name}={:.3}", total.mean()?)))
                    .collect();
                writeln!(f, "{:<16} metrics: {}", "", metrics.join(", "))?;
            }
        }
        Ok(())
    }
}
