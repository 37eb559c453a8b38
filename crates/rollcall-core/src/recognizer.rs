//! k-nearest-neighbors face recognizer over raw pixel vectors.
//!
//! Training keeps the full label set; prediction ranks every stored vector by
//! Euclidean distance to the probe and takes a majority vote among the `k`
//! closest. The model is rebuilt from the label store for every recognition
//! session, there is no incremental update.

use crate::store::LabelSet;
use crate::types::{FeatureVector, LabeledSample};
use std::collections::BTreeMap;
use thiserror::Error;

/// Default neighbor count.
pub const DEFAULT_NEIGHBORS: usize = 5;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("cannot train on an empty label set")]
    EmptyTrainingSet,
    #[error("neighbor count must be at least 1")]
    InvalidNeighbors,
    #[error("probe has {actual} values, model expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Outcome of classifying one probe vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
    pub name: String,
    /// Neighbors that voted for `name`.
    pub votes: usize,
    /// Neighbors consulted (`min(k, samples)`).
    pub neighbors: usize,
    /// Squared distance to the single closest stored vector.
    pub nearest_distance: u64,
}

/// A trained nearest-neighbor model.
pub struct KnnClassifier {
    k: usize,
    feature_len: usize,
    samples: Vec<LabeledSample>,
}

impl KnnClassifier {
    /// Fit the model on every sample in the label set.
    pub fn train(set: LabelSet, k: usize) -> Result<Self, RecognizerError> {
        if k == 0 {
            return Err(RecognizerError::InvalidNeighbors);
        }
        if set.is_empty() {
            return Err(RecognizerError::EmptyTrainingSet);
        }
        let feature_len = set.feature_len();
        tracing::info!(
            samples = set.len(),
            classes = set.summary().len(),
            k,
            "kNN recognizer trained"
        );
        Ok(Self {
            k,
            feature_len,
            samples: set.samples,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn neighbors(&self) -> usize {
        self.k
    }

    /// Classify a probe vector of the canonical length.
    ///
    /// Equal distances are ordered by store position. When fewer than `k`
    /// samples exist all of them vote. A tied vote goes to the name that
    /// sorts first.
    pub fn predict(&self, probe: &FeatureVector) -> Result<Prediction, RecognizerError> {
        if probe.len() != self.feature_len {
            return Err(RecognizerError::DimensionMismatch {
                expected: self.feature_len,
                actual: probe.len(),
            });
        }

        let mut ranked: Vec<(u64, usize)> = self
            .samples
            .iter()
            .enumerate()
            .map(|(i, s)| (probe.squared_distance(&s.features), i))
            .collect();

        let k = self.k.min(ranked.len());
        if k < ranked.len() {
            ranked.select_nth_unstable(k - 1);
            ranked.truncate(k);
        }
        ranked.sort_unstable();

        let mut tally: BTreeMap<&str, usize> = BTreeMap::new();
        for &(_, i) in &ranked {
            *tally.entry(self.samples[i].name.as_str()).or_default() += 1;
        }

        let (name, votes) = tally
            .iter()
            .fold(None::<(&str, usize)>, |best, (&name, &votes)| match best {
                Some((_, v)) if v >= votes => best,
                _ => Some((name, votes)),
            })
            .ok_or(RecognizerError::EmptyTrainingSet)?;

        Ok(Prediction {
            name: name.to_string(),
            votes,
            neighbors: k,
            nearest_distance: ranked[0].0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FEATURE_LEN;

    fn set(rows: &[(&str, u8)]) -> LabelSet {
        let mut set = LabelSet::default();
        set.samples = rows
            .iter()
            .map(|&(name, fill)| LabeledSample {
                name: name.to_string(),
                features: FeatureVector::new(vec![fill; FEATURE_LEN]),
            })
            .collect();
        set
    }

    fn probe(fill: u8) -> FeatureVector {
        FeatureVector::new(vec![fill; FEATURE_LEN])
    }

    #[test]
    fn test_single_class_round_trip() {
        let rows: Vec<(&str, u8)> = (0..20).map(|i| ("Alice", i * 10)).collect();
        let knn = KnnClassifier::train(set(&rows), DEFAULT_NEIGHBORS).unwrap();
        assert_eq!(knn.neighbors(), 5);
        assert_eq!(knn.len(), 20);
        for &(_, fill) in &rows {
            assert_eq!(knn.predict(&probe(fill)).unwrap().name, "Alice");
        }
    }

    #[test]
    fn test_majority_of_nearest_wins() {
        let knn = KnnClassifier::train(
            set(&[
                ("Alice", 10), ("Alice", 12), ("Alice", 14),
                ("Bob", 200), ("Bob", 202), ("Bob", 204),
            ]),
            3,
        )
        .unwrap();

        let p = knn.predict(&probe(11)).unwrap();
        assert_eq!(p.name, "Alice");
        assert_eq!(p.votes, 3);
        assert_eq!(p.neighbors, 3);
        assert_eq!(knn.predict(&probe(199)).unwrap().name, "Bob");
    }

    #[test]
    fn test_outvoted_nearest_neighbor() {
        // The closest vector is Bob's, but Alice holds 3 of the 5 nearest.
        let knn = KnnClassifier::train(
            set(&[
                ("Bob", 100), ("Bob", 140),
                ("Alice", 95), ("Alice", 93), ("Alice", 91),
                ("Bob", 250),
            ]),
            5,
        )
        .unwrap();
        let p = knn.predict(&probe(99)).unwrap();
        assert_eq!(p.name, "Alice");
        assert_eq!(p.votes, 3);
        assert_eq!(p.nearest_distance, FEATURE_LEN as u64);
    }

    #[test]
    fn test_fewer_samples_than_k() {
        let knn = KnnClassifier::train(set(&[("Alice", 10), ("Alice", 20)]), 5).unwrap();
        let p = knn.predict(&probe(15)).unwrap();
        assert_eq!(p.name, "Alice");
        assert_eq!(p.neighbors, 2);
        assert_eq!(p.votes, 2);
    }

    #[test]
    fn test_tied_vote_goes_to_first_name() {
        let knn = KnnClassifier::train(set(&[("Zoe", 10), ("Adam", 10)]), 2).unwrap();
        let p = knn.predict(&probe(10)).unwrap();
        assert_eq!(p.name, "Adam");
        assert_eq!(p.votes, 1);
    }

    #[test]
    fn test_equal_distances_prefer_store_order() {
        // Three vectors at the same distance; k=1 takes the first stored one.
        let knn = KnnClassifier::train(set(&[("Carol", 20), ("Bob", 0), ("Alice", 20)]), 1).unwrap();
        assert_eq!(knn.predict(&probe(10)).unwrap().name, "Carol");
    }

    #[test]
    fn test_rejects_wrong_dimension() {
        let knn = KnnClassifier::train(set(&[("Alice", 1)]), 5).unwrap();
        let err = knn.predict(&FeatureVector::new(vec![0; 7])).unwrap_err();
        assert!(matches!(
            err,
            RecognizerError::DimensionMismatch { expected: FEATURE_LEN, actual: 7 }
        ));
    }

    #[test]
    fn test_rejects_empty_set_and_zero_k() {
        assert!(matches!(
            KnnClassifier::train(LabelSet::default(), 5),
            Err(RecognizerError::EmptyTrainingSet)
        ));
        assert!(matches!(
            KnnClassifier::train(set(&[("Alice", 1)]), 0),
            Err(RecognizerError::InvalidNeighbors)
        ));
    }
}
