//! Bagged decision-tree classifier for churn prediction

use crate::error::AnalysisError;
use linfa::prelude::*;
use linfa_trees::DecisionTree;
use ndarray::{Array1, Array2, Axis, Ix1};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

/// Labelled feature matrix, one row per customer
pub type ChurnDataset = Dataset<f64, usize, Ix1>;

/// Ensemble of decision trees, each grown on a bootstrap sample
#[derive(Debug)]
pub struct ChurnForest {
    /// Fitted trees from linfa
    pub trees: Vec<DecisionTree<f64, usize>>,
    /// Number of features each tree was trained on
    pub n_features: usize,
}

impl ChurnForest {
    /// Fraction of trees voting for class 1, per row
    pub fn predict_proba(&self, records: &Array2<f64>) -> crate::Result<Array1<f64>> {
        if records.ncols() != self.n_features {
            anyhow::bail!(
                "Feature matrix must have exactly {} columns, got {}",
                self.n_features,
                records.ncols()
            );
        }

        let mut votes = Array1::<f64>::zeros(records.nrows());
        for tree in &self.trees {
            let predictions: Array1<usize> = tree.predict(records);
            for (vote, &class) in votes.iter_mut().zip(predictions.iter()) {
                if class == 1 {
                    *vote += 1.0;
                }
            }
        }
        Ok(votes / self.trees.len() as f64)
    }

    /// Majority vote, ties going to class 1
    pub fn predict(&self, records: &Array2<f64>) -> crate::Result<Array1<usize>> {
        let proba = self.predict_proba(records)?;
        Ok(proba.mapv(|p| usize::from(p >= 0.5)))
    }

    /// Mean impurity-based importance per feature, normalised to sum to 1
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.n_features];
        for tree in &self.trees {
            for (total, importance) in totals.iter_mut().zip(tree.feature_importance()) {
                if importance.is_finite() {
                    *total += importance;
                }
            }
        }
        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            totals.iter_mut().for_each(|t| *t /= sum);
        }
        totals
    }
}

/// Fit a bagged tree ensemble
///
/// # Arguments
/// * `dataset` - Training records and 0/1 targets
/// * `n_trees` - Number of bootstrap trees
/// * `rng` - Seeded generator driving the bootstrap
pub fn fit_forest(dataset: &ChurnDataset, n_trees: usize, rng: &mut StdRng) -> crate::Result<ChurnForest> {
    let n_samples = dataset.nsamples();
    if n_samples == 0 {
        return Err(AnalysisError::DegenerateInput("no training rows for the churn model".into()).into());
    }
    if n_trees == 0 {
        anyhow::bail!("Forest needs at least one tree");
    }

    let records = dataset.records();
    let targets = dataset.targets();

    let mut trees = Vec::with_capacity(n_trees);
    for _ in 0..n_trees {
        let sample: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
        let bootstrap = Dataset::new(
            records.select(Axis(0), &sample),
            targets.select(Axis(0), &sample),
        );
        trees.push(fit_tree(&bootstrap)?);
    }

    Ok(ChurnForest {
        trees,
        n_features: records.ncols(),
    })
}

fn fit_tree(dataset: &ChurnDataset) -> linfa_trees::Result<DecisionTree<f64, usize>> {
    DecisionTree::params().fit(dataset)
}

/// Shuffle rows with `rng` and hold out `ceil(test_size * n)` of them
///
/// # Returns
/// * `(train, test)` datasets
pub fn train_test_split(
    records: &Array2<f64>,
    targets: &Array1<usize>,
    test_size: f64,
    rng: &mut StdRng,
) -> crate::Result<(ChurnDataset, ChurnDataset)> {
    let n_samples = records.nrows();
    let n_test = (test_size * n_samples as f64).ceil() as usize;
    if n_test == 0 || n_test >= n_samples {
        return Err(AnalysisError::DegenerateInput(format!(
            "cannot split {n_samples} rows with test size {test_size}"
        ))
        .into());
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    indices.shuffle(rng);
    let (test_idx, train_idx) = indices.split_at(n_test);

    let train = Dataset::new(
        records.select(Axis(0), train_idx),
        targets.select(Axis(0), train_idx),
    );
    let test = Dataset::new(
        records.select(Axis(0), test_idx),
        targets.select(Axis(0), test_idx),
    );
    Ok((train, test))
}

/// Precision, recall and F1 of one class
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassMetrics {
    pub class: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub total: usize,
}

/// Per-class metrics for binary labels; undefined ratios are reported as 0.
pub fn classification_report(truth: &Array1<usize>, predicted: &Array1<usize>) -> ClassificationReport {
    let total = truth.len();
    let correct = truth.iter().zip(predicted.iter()).filter(|(t, p)| t == p).count();

    let classes = [0usize, 1]
        .iter()
        .map(|&class| {
            let true_positive = truth
                .iter()
                .zip(predicted.iter())
                .filter(|(t, p)| **t == class && **p == class)
                .count();
            let predicted_positive = predicted.iter().filter(|p| **p == class).count();
            let support = truth.iter().filter(|t| **t == class).count();

            let precision = ratio(true_positive, predicted_positive);
            let recall = ratio(true_positive, support);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            ClassMetrics {
                class,
                precision,
                recall,
                f1,
                support,
            }
        })
        .collect();

    ClassificationReport {
        classes,
        accuracy: ratio(correct, total),
        total,
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    /// Churners have long gaps and few purchases; loyal customers the opposite.
    fn create_test_dataset() -> (Array2<f64>, Array1<usize>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let churned = i % 2 == 0;
            let frequency = if churned { 2.0 + (i % 3) as f64 } else { 10.0 + (i % 5) as f64 };
            let monetary = 100.0 + (i * 17 % 50) as f64;
            let lifetime = if churned { 20.0 } else { 250.0 } + (i % 7) as f64;
            rows.extend_from_slice(&[frequency, monetary, lifetime]);
            labels.push(usize::from(churned));
        }
        (
            Array2::from_shape_vec((40, 3), rows).unwrap(),
            Array1::from_vec(labels),
        )
    }

    #[test]
    fn test_fit_forest_separates_classes() {
        let (records, targets) = create_test_dataset();
        let mut rng = StdRng::seed_from_u64(42);
        let dataset = Dataset::new(records.clone(), targets.clone());

        let forest = fit_forest(&dataset, 25, &mut rng).unwrap();
        assert_eq!(forest.trees.len(), 25);

        let proba = forest.predict_proba(&records).unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));

        let predicted = forest.predict(&records).unwrap();
        let report = classification_report(&targets, &predicted);
        assert!(report.accuracy > 0.9);
    }

    #[test]
    fn test_feature_importances_normalised() {
        let (records, targets) = create_test_dataset();
        let mut rng = StdRng::seed_from_u64(7);
        let forest = fit_forest(&Dataset::new(records, targets), 10, &mut rng).unwrap();

        let importances = forest.feature_importances();
        assert_eq!(importances.len(), 3);
        assert!(importances.iter().all(|i| *i >= 0.0));
        assert!((importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_split_is_seeded() {
        let (records, targets) = create_test_dataset();
        let (train_a, test_a) =
            train_test_split(&records, &targets, 0.3, &mut StdRng::seed_from_u64(42)).unwrap();
        let (train_b, test_b) =
            train_test_split(&records, &targets, 0.3, &mut StdRng::seed_from_u64(42)).unwrap();

        assert_eq!(test_a.nsamples(), 12);
        assert_eq!(train_a.nsamples(), 28);
        assert_eq!(test_a.records(), test_b.records());
        assert_eq!(train_a.targets(), train_b.targets());
    }

    #[test]
    fn test_split_rejects_tiny_input() {
        let records = array![[1.0, 2.0, 3.0]];
        let targets = array![1usize];
        assert!(train_test_split(&records, &targets, 0.3, &mut StdRng::seed_from_u64(1)).is_err());
    }

    #[test]
    fn test_classification_report() {
        let truth = array![1usize, 1, 0, 0, 1];
        let predicted = array![1usize, 0, 0, 1, 1];
        let report = classification_report(&truth, &predicted);

        assert!((report.accuracy - 0.6).abs() < 1e-12);
        let positive = report.classes[1];
        assert_eq!(positive.support, 3);
        assert!((positive.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((positive.recall - 2.0 / 3.0).abs() < 1e-12);

        let negative = report.classes[0];
        assert_eq!(negative.support, 2);
        assert!((negative.precision - 0.5).abs() < 1e-12);
        assert!((negative.recall - 0.5).abs() < 1e-12);
    }
}
