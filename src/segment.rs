//! Threshold-based customer tiering
//!
//! A [`Segmenter`] holds an ordered list of rules and a default label. Rules
//! are checked in order and the first one the score satisfies wins, so
//! callers list the most demanding tier first.

use crate::config::RfmThresholds;
use std::collections::BTreeMap;
use std::fmt;

/// Condition a score must meet for a rule to apply
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    AtLeast(f64),
    AtMost(f64),
    Exactly(f64),
}

impl Bound {
    /// NaN never satisfies a bound.
    pub fn admits(&self, score: f64) -> bool {
        match *self {
            Bound::AtLeast(limit) => score >= limit,
            Bound::AtMost(limit) => score <= limit,
            Bound::Exactly(limit) => score == limit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Segmenter<L> {
    rules: Vec<(Bound, L)>,
    default: L,
}

impl<L: Copy> Segmenter<L> {
    pub fn new(default: L) -> Self {
        Self {
            rules: Vec::new(),
            default,
        }
    }

    /// Append a rule; earlier rules take precedence.
    pub fn rule(mut self, bound: Bound, label: L) -> Self {
        self.rules.push((bound, label));
        self
    }

    /// Tiers keyed on percentiles of `scores`, highest percentile checked first.
    ///
    /// With no scores every customer falls through to `default`.
    pub fn from_percentiles(scores: &[f64], tiers: &[(f64, L)], default: L) -> Self {
        let mut ordered: Vec<(f64, L)> = tiers.to_vec();
        ordered.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut segmenter = Self::new(default);
        for (percentile, label) in ordered {
            if let Some(cutoff) = quantile(scores, percentile) {
                segmenter = segmenter.rule(Bound::AtLeast(cutoff), label);
            }
        }
        segmenter
    }

    pub fn assign(&self, score: f64) -> L {
        self.rules
            .iter()
            .find(|(bound, _)| bound.admits(score))
            .map_or(self.default, |(_, label)| *label)
    }

    pub fn rules(&self) -> &[(Bound, L)] {
        &self.rules
    }
}

/// Quantile with linear interpolation between closest ranks; NaN scores are ignored.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Count labels, most common first (ties in label order).
pub fn value_counts<L, I>(labels: I) -> Vec<(L, usize)>
where
    L: Ord + Copy,
    I: IntoIterator<Item = L>,
{
    let mut counts: BTreeMap<L, usize> = BTreeMap::new();
    for label in labels {
        *counts.entry(label).or_insert(0) += 1;
    }
    let mut counts: Vec<(L, usize)> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueTier {
    High,
    Average,
    Low,
    VeryLow,
}

impl fmt::Display for ValueTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueTier::High => "High Value",
            ValueTier::Average => "Average Value",
            ValueTier::Low => "Low Value",
            ValueTier::VeryLow => "Very Low Value",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FrequencyTier {
    OneTime,
    Few,
    Occasional,
    Frequent,
}

impl fmt::Display for FrequencyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FrequencyTier::OneTime => "One-Time",
            FrequencyTier::Few => "Few",
            FrequencyTier::Occasional => "Occasional",
            FrequencyTier::Frequent => "Frequent",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecencyTier {
    Recent,
    NeedsAttention,
    AtRisk,
    Churned,
}

impl fmt::Display for RecencyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecencyTier::Recent => "Recent",
            RecencyTier::NeedsAttention => "Needs Attention",
            RecencyTier::AtRisk => "At Risk",
            RecencyTier::Churned => "Churned",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChurnRisk {
    Low,
    Medium,
    High,
    Churned,
    Unknown,
}

impl fmt::Display for ChurnRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChurnRisk::Low => "Low Risk",
            ChurnRisk::Medium => "Medium Risk",
            ChurnRisk::High => "High Risk",
            ChurnRisk::Churned => "Churned",
            ChurnRisk::Unknown => "Unknown",
        })
    }
}

pub fn monetary_segmenter(thresholds: &RfmThresholds) -> Segmenter<ValueTier> {
    let [high, average, low] = thresholds.monetary;
    Segmenter::new(ValueTier::VeryLow)
        .rule(Bound::AtLeast(high), ValueTier::High)
        .rule(Bound::AtLeast(average), ValueTier::Average)
        .rule(Bound::AtLeast(low), ValueTier::Low)
}

pub fn frequency_segmenter(thresholds: &RfmThresholds) -> Segmenter<FrequencyTier> {
    let [one_time, few, occasional] = thresholds.frequency;
    Segmenter::new(FrequencyTier::Frequent)
        .rule(Bound::Exactly(one_time), FrequencyTier::OneTime)
        .rule(Bound::AtMost(few), FrequencyTier::Few)
        .rule(Bound::AtMost(occasional), FrequencyTier::Occasional)
}

pub fn recency_segmenter(thresholds: &RfmThresholds) -> Segmenter<RecencyTier> {
    let [recent, attention, at_risk] = thresholds.recency;
    Segmenter::new(RecencyTier::Churned)
        .rule(Bound::AtMost(recent), RecencyTier::Recent)
        .rule(Bound::AtMost(attention), RecencyTier::NeedsAttention)
        .rule(Bound::AtMost(at_risk), RecencyTier::AtRisk)
}

pub fn churn_risk_segmenter(cutoffs: &[f64; 4]) -> Segmenter<ChurnRisk> {
    Segmenter::new(ChurnRisk::Unknown)
        .rule(Bound::AtMost(cutoffs[0]), ChurnRisk::Low)
        .rule(Bound::AtMost(cutoffs[1]), ChurnRisk::Medium)
        .rule(Bound::AtMost(cutoffs[2]), ChurnRisk::High)
        .rule(Bound::AtMost(cutoffs[3]), ChurnRisk::Churned)
}

/// High / Average / Low value tiers from percentiles of projected value
pub fn clv_segmenter(scores: &[f64], high_percentile: f64, average_percentile: f64) -> Segmenter<ValueTier> {
    Segmenter::from_percentiles(
        scores,
        &[
            (high_percentile, ValueTier::High),
            (average_percentile, ValueTier::Average),
        ],
        ValueTier::Low,
    )
}
