//! Personalized re-ranking of recommendation candidates.
//!
//! Each user gets a profile vector: a running, normalized blend of the
//! item embeddings they interact with, shifted by an exponential moving
//! average on every interaction. Ranking blends a candidate's original
//! retrieval score with its similarity to the profile.
//!
//! Profiles are process-lifetime state; they are not persisted and items
//! cannot be forgotten. The profile table is sharded so updates to one
//! user never block reads or writes for another.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::vector::{SharedVectorIndex, dot, l2_normalize};

/// Errors from ranking operations.
#[derive(Error, Debug)]
pub enum RankingError {
    #[error(
        "Item '{0}' not found in vector index\nSuggestion: Add the item's embedding before recording interactions with it"
    )]
    ItemNotFound(String),
}

/// A candidate item flowing through re-ranking.
///
/// `score` is the working value the final sort uses; `original_score`
/// preserves the retrieval score and `personalization_score` is absent
/// when the item has no embedding to compare against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub item_id: String,
    pub score: f32,
    pub original_score: f32,
    pub personalization_score: Option<f32>,
}

impl Candidate {
    /// Creates a candidate from a retrieval result.
    #[must_use]
    pub fn new(item_id: impl Into<String>, score: f32) -> Self {
        Self {
            item_id: item_id.into(),
            score,
            original_score: score,
            personalization_score: None,
        }
    }
}

/// Per-user preference learning and candidate re-ranking.
pub struct RankingEngine {
    index: SharedVectorIndex,
    profiles: DashMap<String, Vec<f32>>,
}

impl RankingEngine {
    /// Creates an engine reading item vectors from the given index.
    #[must_use]
    pub fn new(index: SharedVectorIndex) -> Self {
        Self {
            index,
            profiles: DashMap::new(),
        }
    }

    /// Records an interaction and shifts the user's profile toward the item.
    ///
    /// `weight` in [0, 1] is the interaction strength (a purchase moves
    /// the profile further than a view); out-of-range values are clamped.
    /// The first interaction sets the profile to the item vector exactly;
    /// later ones blend by exponential moving average and re-normalize.
    /// A zero-norm blend leaves the profile unchanged. Unknown items fail
    /// with [`RankingError::ItemNotFound`] and change nothing.
    pub fn record_interaction(
        &self,
        user_id: &str,
        item_id: &str,
        weight: f32,
    ) -> Result<(), RankingError> {
        let item_vector = self
            .index
            .embedding(item_id)
            .ok_or_else(|| RankingError::ItemNotFound(item_id.to_string()))?;

        let weight = weight.clamp(0.0, 1.0);

        self.profiles
            .entry(user_id.to_string())
            .and_modify(|profile| {
                let mut blended: Vec<f32> = profile
                    .iter()
                    .zip(item_vector.iter())
                    .map(|(old, item)| (1.0 - weight) * old + weight * item)
                    .collect();
                if l2_normalize(&mut blended) {
                    *profile = blended;
                }
            })
            .or_insert_with(|| item_vector.clone());

        debug!("Updated user {user_id} profile with item {item_id} (weight={weight})");
        Ok(())
    }

    /// Re-scores and re-sorts candidates for a user.
    ///
    /// `alpha` in [0, 1] is the weight of the original retrieval score;
    /// the remainder goes to profile similarity. Users without a profile
    /// and empty candidate lists pass through unchanged - missing
    /// personalization data is a normal condition, not an error. The
    /// sort is stable and descending, so equal final scores keep their
    /// input order.
    #[must_use]
    pub fn rank_candidates(
        &self,
        user_id: &str,
        mut candidates: Vec<Candidate>,
        alpha: f32,
    ) -> Vec<Candidate> {
        let Some(profile) = self.profiles.get(user_id).map(|entry| entry.value().clone()) else {
            return candidates;
        };
        if candidates.is_empty() {
            return candidates;
        }

        let alpha = alpha.clamp(0.0, 1.0);

        for candidate in &mut candidates {
            match self.index.embedding(&candidate.item_id) {
                Some(item_vector) => {
                    let personalization = dot(&profile, &item_vector);
                    candidate.personalization_score = Some(personalization);
                    candidate.score =
                        alpha * candidate.original_score + (1.0 - alpha) * personalization;
                }
                None => {
                    candidate.personalization_score = None;
                    candidate.score = candidate.original_score;
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates
    }

    /// Returns a copy of the user's profile vector, if one exists.
    #[must_use]
    pub fn profile(&self, user_id: &str) -> Option<Vec<f32>> {
        self.profiles.get(user_id).map(|entry| entry.value().clone())
    }

    /// Number of users with a learned profile.
    #[must_use]
    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }
}

impl std::fmt::Debug for RankingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RankingEngine")
            .field("profiles", &self.profiles.len())
            .field("index", &self.index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FsBlobStore;
    use crate::vector::VectorDimension;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_index(temp_dir: &TempDir, dim: usize) -> SharedVectorIndex {
        let store = Arc::new(FsBlobStore::new(temp_dir.path()));
        SharedVectorIndex::open(store, VectorDimension::new(dim).unwrap())
    }

    fn unit_vec(dim: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis] = 1.0;
        v
    }

    #[test]
    fn test_first_interaction_sets_profile_to_item_vector() {
        let temp_dir = TempDir::new().unwrap();
        let index = test_index(&temp_dir, 4);
        index.add("item1", &unit_vec(4, 0)).unwrap();

        let engine = RankingEngine::new(index);
        engine.record_interaction("u1", "item1", 1.0).unwrap();

        assert_eq!(engine.profile("u1").unwrap(), unit_vec(4, 0));
        assert_eq!(engine.profile_count(), 1);
    }

    #[test]
    fn test_ema_update_stays_normalized() {
        let temp_dir = TempDir::new().unwrap();
        let index = test_index(&temp_dir, 2);
        index.add("x_axis", &[1.0, 0.0]).unwrap();
        index.add("y_axis", &[0.0, 1.0]).unwrap();

        let engine = RankingEngine::new(index);
        engine.record_interaction("u1", "x_axis", 1.0).unwrap();
        engine.record_interaction("u1", "y_axis", 0.5).unwrap();

        let profile = engine.profile("u1").unwrap();
        let norm = dot(&profile, &profile).sqrt();
        assert!((norm - 1.0).abs() < 1e-5);

        // Equal blend of the two axes.
        assert!((profile[0] - profile[1]).abs() < 1e-5);
        assert!(profile[0] > 0.0);
    }

    #[test]
    fn test_unknown_item_is_error_and_no_state_change() {
        let temp_dir = TempDir::new().unwrap();
        let index = test_index(&temp_dir, 2);

        let engine = RankingEngine::new(index);
        let result = engine.record_interaction("u1", "ghost", 1.0);

        assert!(matches!(result, Err(RankingError::ItemNotFound(id)) if id == "ghost"));
        assert!(engine.profile("u1").is_none());
        assert_eq!(engine.profile_count(), 0);
    }

    #[test]
    fn test_out_of_range_weight_is_clamped() {
        let temp_dir = TempDir::new().unwrap();
        let index = test_index(&temp_dir, 2);
        index.add("x_axis", &[1.0, 0.0]).unwrap();
        index.add("y_axis", &[0.0, 1.0]).unwrap();

        let engine = RankingEngine::new(index);
        engine.record_interaction("u1", "x_axis", 1.0).unwrap();
        // weight > 1 behaves like weight = 1: the profile snaps to the item.
        engine.record_interaction("u1", "y_axis", 5.0).unwrap();

        assert_eq!(engine.profile("u1").unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_opposite_vectors_zero_blend_keeps_profile() {
        let temp_dir = TempDir::new().unwrap();
        let index = test_index(&temp_dir, 2);
        index.add("plus", &[1.0, 0.0]).unwrap();
        index.add("minus", &[-1.0, 0.0]).unwrap();

        let engine = RankingEngine::new(index);
        engine.record_interaction("u1", "plus", 1.0).unwrap();
        // 0.5 * plus + 0.5 * minus has zero norm; the profile must survive.
        engine.record_interaction("u1", "minus", 0.5).unwrap();

        assert_eq!(engine.profile("u1").unwrap(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_passthrough_without_profile() {
        let temp_dir = TempDir::new().unwrap();
        let index = test_index(&temp_dir, 2);
        let engine = RankingEngine::new(index);

        let candidates = vec![
            Candidate::new("b", 0.4),
            Candidate::new("a", 0.9),
            Candidate::new("c", 0.1),
        ];
        let ranked = engine.rank_candidates("unknown_user", candidates.clone(), 0.5);

        // Same order, same scores - no re-sort for users we know nothing about.
        assert_eq!(ranked, candidates);
    }

    #[test]
    fn test_empty_candidates_pass_through() {
        let temp_dir = TempDir::new().unwrap();
        let index = test_index(&temp_dir, 2);
        index.add("item", &[1.0, 0.0]).unwrap();

        let engine = RankingEngine::new(index);
        engine.record_interaction("u1", "item", 1.0).unwrap();

        assert!(engine.rank_candidates("u1", Vec::new(), 0.5).is_empty());
    }

    #[test]
    fn test_personalization_boosts_interacted_item() {
        let temp_dir = TempDir::new().unwrap();
        let index = test_index(&temp_dir, 4);
        index.add("item1", &unit_vec(4, 0)).unwrap();

        let engine = RankingEngine::new(index);
        engine.record_interaction("u1", "item1", 1.0).unwrap();

        let ranked = engine.rank_candidates(
            "u1",
            vec![
                Candidate::new("some_other_item", 0.6),
                Candidate::new("item1", 0.5),
            ],
            0.5,
        );

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].item_id, "item1");
        assert!((ranked[0].score - 0.75).abs() < 1e-5);
        assert!(ranked[0].personalization_score.unwrap() > 0.99);

        // No vector for the other item: original score, no personalization.
        assert_eq!(ranked[1].item_id, "some_other_item");
        assert_eq!(ranked[1].score, 0.6);
        assert!(ranked[1].personalization_score.is_none());
    }

    #[test]
    fn test_stable_sort_keeps_input_order_on_ties() {
        let temp_dir = TempDir::new().unwrap();
        let index = test_index(&temp_dir, 2);
        index.add("liked", &[1.0, 0.0]).unwrap();

        let engine = RankingEngine::new(index);
        engine.record_interaction("u1", "liked", 1.0).unwrap();

        // Neither candidate has a vector, so both keep their original
        // (equal) scores and their relative order.
        let ranked = engine.rank_candidates(
            "u1",
            vec![Candidate::new("tie_a", 0.5), Candidate::new("tie_b", 0.5)],
            0.5,
        );
        assert_eq!(ranked[0].item_id, "tie_a");
        assert_eq!(ranked[1].item_id, "tie_b");
    }

    #[test]
    fn test_alpha_extremes() {
        let temp_dir = TempDir::new().unwrap();
        let index = test_index(&temp_dir, 2);
        index.add("item", &[1.0, 0.0]).unwrap();

        let engine = RankingEngine::new(index);
        engine.record_interaction("u1", "item", 1.0).unwrap();

        // alpha = 1.0: pure original score.
        let ranked = engine.rank_candidates("u1", vec![Candidate::new("item", 0.3)], 1.0);
        assert!((ranked[0].score - 0.3).abs() < 1e-6);

        // alpha = 0.0: pure personalization.
        let ranked = engine.rank_candidates("u1", vec![Candidate::new("item", 0.3)], 0.0);
        assert!((ranked[0].score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_profiles_are_independent_across_users() {
        use std::thread;

        let temp_dir = TempDir::new().unwrap();
        let index = test_index(&temp_dir, 2);
        index.add("x_axis", &[1.0, 0.0]).unwrap();
        index.add("y_axis", &[0.0, 1.0]).unwrap();

        let engine = Arc::new(RankingEngine::new(index));
        let other = Arc::clone(&engine);

        let handle = thread::spawn(move || {
            for _ in 0..100 {
                other.record_interaction("u2", "y_axis", 0.5).unwrap();
            }
        });

        for _ in 0..100 {
            engine.record_interaction("u1", "x_axis", 0.5).unwrap();
        }
        handle.join().unwrap();

        assert_eq!(engine.profile("u1").unwrap(), vec![1.0, 0.0]);
        assert_eq!(engine.profile("u2").unwrap(), vec![0.0, 1.0]);
    }
}
