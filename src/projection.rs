//! Customer lifetime value projection
//!
//! Combines the purchase model with the spend model: the horizon is cut into
//! fixed-length periods, and each period contributes the expected spend per
//! transaction times the purchases expected in that period, discounted back
//! to the present.

use crate::calibration::CustomerSummary;
use crate::lifetime_model::{BgNbdModel, PurchaseHistory};
use crate::spend_model::GammaGammaModel;

/// Projection of one customer over the horizon
#[derive(Debug, Clone, PartialEq)]
pub struct ValueProjection {
    pub customer_id: String,
    /// Discounted expected spend, rounded to cents
    pub clv: f64,
    /// Expected purchases over the whole horizon
    pub expected_purchases: f64,
    pub probability_alive: f64,
}

pub struct ValueProjector<'a> {
    lifetime: &'a BgNbdModel,
    spend: &'a GammaGammaModel,
    horizon_days: i64,
    period_days: i64,
    discount_rate: f64,
}

impl<'a> ValueProjector<'a> {
    pub fn new(
        lifetime: &'a BgNbdModel,
        spend: &'a GammaGammaModel,
        horizon_days: i64,
        period_days: i64,
        discount_rate: f64,
    ) -> Self {
        Self {
            lifetime,
            spend,
            horizon_days,
            period_days,
            discount_rate,
        }
    }

    /// Unrounded discounted value of one customer
    pub fn customer_lifetime_value(&self, summary: &CustomerSummary) -> f64 {
        let history = PurchaseHistory::from(summary);
        let average_profit = self
            .spend
            .conditional_expected_average_profit(summary.frequency as f64, summary.monetary_value);

        let mut value = 0.0;
        let mut previous = 0.0;
        for t in self.period_ends() {
            let cumulative = self.lifetime.expected_purchases(t, &history);
            let discount = (1.0 + self.discount_rate).powf(t / self.period_days as f64);
            value += average_profit * (cumulative - previous) / discount;
            previous = cumulative;
        }
        value
    }

    pub fn project(&self, summaries: &[CustomerSummary]) -> Vec<ValueProjection> {
        summaries
            .iter()
            .map(|summary| {
                let history = PurchaseHistory::from(summary);
                ValueProjection {
                    customer_id: summary.customer_id.clone(),
                    clv: round_to_cents(self.customer_lifetime_value(summary)),
                    expected_purchases: self
                        .lifetime
                        .expected_purchases(self.horizon_days as f64, &history),
                    probability_alive: self.lifetime.probability_alive(&history),
                }
            })
            .collect()
    }

    /// Period boundaries in days; the last one is clipped to the horizon.
    fn period_ends(&self) -> Vec<f64> {
        let mut ends = Vec::new();
        let mut t = self.period_days;
        while t < self.horizon_days {
            ends.push(t as f64);
            t += self.period_days;
        }
        ends.push(self.horizon_days as f64);
        ends
    }
}

/// Round to two decimal places
pub fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifetime_model::BgNbdParams;
    use crate::spend_model::GammaGammaParams;
    use proptest::prelude::*;

    fn lifetime() -> BgNbdModel {
        BgNbdModel {
            params: BgNbdParams {
                r: 0.8,
                alpha: 60.0,
                a: 1.5,
                b: 2.5,
            },
            penalizer: 0.0,
            negative_log_likelihood: 0.0,
            n_customers: 0,
        }
    }

    fn spend() -> GammaGammaModel {
        GammaGammaModel {
            params: GammaGammaParams {
                p: 6.25,
                q: 3.74,
                v: 15.44,
            },
            penalizer: 0.0,
            negative_log_likelihood: 0.0,
            n_customers: 0,
        }
    }

    fn summary(id: &str, frequency: i64, recency: i64, t: i64, monetary_value: f64) -> CustomerSummary {
        CustomerSummary {
            customer_id: id.to_string(),
            frequency,
            recency,
            t,
            monetary_value,
        }
    }

    #[test]
    fn test_period_ends_clip_to_horizon() {
        let (l, s) = (lifetime(), spend());
        assert_eq!(
            ValueProjector::new(&l, &s, 180, 30, 0.01).period_ends(),
            vec![30.0, 60.0, 90.0, 120.0, 150.0, 180.0]
        );
        assert_eq!(
            ValueProjector::new(&l, &s, 45, 30, 0.01).period_ends(),
            vec![30.0, 45.0]
        );
    }

    #[test]
    fn test_projection_is_deterministic_and_rounded() {
        let (l, s) = (lifetime(), spend());
        let projector = ValueProjector::new(&l, &s, 180, 30, 0.01);
        let customers = vec![
            summary("A", 6, 170, 180, 120.0),
            summary("B", 1, 10, 180, 40.0),
        ];

        let first = projector.project(&customers);
        let second = projector.project(&customers);
        assert_eq!(first, second);

        for p in &first {
            assert!(p.clv >= 0.0);
            assert_eq!(round_to_cents(p.clv), p.clv);
            assert!(p.probability_alive > 0.0 && p.probability_alive <= 1.0);
        }
        assert!(first[0].clv > first[1].clv);
    }

    #[test]
    fn test_discounting_reduces_value() {
        let (l, s) = (lifetime(), spend());
        let c = summary("A", 6, 170, 180, 120.0);
        let undiscounted = ValueProjector::new(&l, &s, 180, 30, 0.0).customer_lifetime_value(&c);
        let discounted = ValueProjector::new(&l, &s, 180, 30, 0.05).customer_lifetime_value(&c);
        assert!(discounted < undiscounted);

        // with no discounting the periods telescope to total purchases * spend
        let history = PurchaseHistory::from(&c);
        let total = l.expected_purchases(180.0, &history)
            * s.conditional_expected_average_profit(6.0, 120.0);
        assert!((undiscounted - total).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_rounding_is_idempotent(value in -1.0e6f64..1.0e6) {
            let once = round_to_cents(value);
            prop_assert_eq!(round_to_cents(once), once);
        }
    }
}
