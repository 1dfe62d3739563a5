//! Threshold-based RFM segmentation

use crate::config::RfmThresholds;
use crate::features::RfmRecord;
use crate::segment::{
    frequency_segmenter, monetary_segmenter, recency_segmenter, value_counts, FrequencyTier,
    RecencyTier, ValueTier,
};
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct RfmSegment {
    pub customer_id: String,
    pub recency_status: RecencyTier,
    pub monetary_status: ValueTier,
    pub frequency_status: FrequencyTier,
}

/// Label counts per status column, most common first
#[derive(Debug, Clone, PartialEq)]
pub struct RfmDistribution {
    pub recency: Vec<(RecencyTier, usize)>,
    pub monetary: Vec<(ValueTier, usize)>,
    pub frequency: Vec<(FrequencyTier, usize)>,
}

pub fn segment_customers(records: &[RfmRecord], thresholds: &RfmThresholds) -> Vec<RfmSegment> {
    let recency = recency_segmenter(thresholds);
    let monetary = monetary_segmenter(thresholds);
    let frequency = frequency_segmenter(thresholds);

    let segments: Vec<RfmSegment> = records
        .iter()
        .map(|r| RfmSegment {
            customer_id: r.customer_id.clone(),
            recency_status: recency.assign(r.recency as f64),
            monetary_status: monetary.assign(r.monetary),
            frequency_status: frequency.assign(r.frequency as f64),
        })
        .collect();

    info!(customers = segments.len(), "RFM segments assigned");
    segments
}

pub fn distribution(segments: &[RfmSegment]) -> RfmDistribution {
    RfmDistribution {
        recency: value_counts(segments.iter().map(|s| s.recency_status)),
        monetary: value_counts(segments.iter().map(|s| s.monetary_status)),
        frequency: value_counts(segments.iter().map(|s| s.frequency_status)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, recency: i64, frequency: i64, monetary: f64) -> RfmRecord {
        RfmRecord {
            customer_id: id.to_string(),
            recency,
            frequency,
            monetary,
            customer_lifetime_days: 0,
            purchase_days: frequency,
        }
    }

    #[test]
    fn test_segment_customers() {
        let records = vec![
            record("A", 10, 1, 6000.0),
            record("B", 60, 3, 800.0),
            record("C", 400, 12, 50.0),
        ];
        let segments = segment_customers(&records, &RfmThresholds::default());

        assert_eq!(segments[0].monetary_status, ValueTier::High);
        assert_eq!(segments[0].frequency_status, FrequencyTier::OneTime);
        assert_eq!(segments[0].recency_status, RecencyTier::Recent);

        assert_eq!(segments[1].monetary_status, ValueTier::Low);
        assert_eq!(segments[1].frequency_status, FrequencyTier::Few);
        assert_eq!(segments[1].recency_status, RecencyTier::NeedsAttention);

        assert_eq!(segments[2].monetary_status, ValueTier::VeryLow);
        assert_eq!(segments[2].frequency_status, FrequencyTier::Frequent);
        assert_eq!(segments[2].recency_status, RecencyTier::Churned);
    }

    #[test]
    fn test_distribution_counts_every_customer() {
        let records = vec![
            record("A", 10, 1, 6000.0),
            record("B", 20, 1, 7000.0),
            record("C", 200, 4, 50.0),
        ];
        let dist = distribution(&segment_customers(&records, &RfmThresholds::default()));

        assert_eq!(dist.monetary[0], (ValueTier::High, 2));
        assert_eq!(dist.recency.iter().map(|(_, n)| n).sum::<usize>(), 3);
        assert_eq!(
            dist.frequency,
            vec![(FrequencyTier::OneTime, 2), (FrequencyTier::Occasional, 1)]
        );
    }
}
