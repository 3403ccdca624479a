/**
 * FairReco
 * Copyright (C) 2018 Sebastian Schelter
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use scoped_pool::Pool;

use crate::error::ScoringError;
use crate::oracle::ScoringOracle;
use crate::types::{CandidateMatrix, DenseMatrix};
use crate::utils;

/// Result type used to find the top-n candidates per user via a binary heap
#[derive(PartialEq,Debug)]
pub struct ScoredItem {
    pub item: u32,
    pub score: f64,
}

/// Ordering for our max-heap: the top of the heap is the weakest candidate. Lower scores are
/// weaker, and among equal scores the later item is weaker so that ties keep the oracle's
/// native item order. There is no total order on floating point numbers, incomparable scores
/// are treated as equal.
fn cmp_reverse(scored_item_a: &ScoredItem, scored_item_b: &ScoredItem) -> Ordering {
    let by_score = match scored_item_a.score.partial_cmp(&scored_item_b.score) {
        Some(Ordering::Less) => Ordering::Greater,
        Some(Ordering::Greater) => Ordering::Less,
        Some(Ordering::Equal) => Ordering::Equal,
        None => Ordering::Equal
    };

    by_score.then(scored_item_a.item.cmp(&scored_item_b.item))
}

impl Eq for ScoredItem {}

impl Ord for ScoredItem {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_reverse(self, other)
    }
}

impl PartialOrd for ScoredItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(cmp_reverse(self, other))
    }
}

/// Indices of the `n` highest scores, best first.
pub fn top_n_indices(scores: &[f64], n: usize) -> Vec<u32> {

    let mut heap = BinaryHeap::with_capacity(n);

    for (item, score) in scores.iter().enumerate() {
        let scored_item = ScoredItem { item: item as u32, score: *score };

        if heap.len() < n {
            heap.push(scored_item);
        } else if let Some(mut top) = heap.peek_mut() {
            if scored_item < *top {
                *top = scored_item;
            }
        }
    }

    heap.into_sorted_vec()
        .into_iter()
        .map(|scored_item| scored_item.item)
        .collect()
}

/// Score matrix S and candidate matrix P of one scoring model.
#[derive(Debug)]
pub struct RankingMatrices {
    pub scores: DenseMatrix,
    pub candidates: CandidateMatrix,
    /// Users the oracle could not score, their rows in `scores` and `candidates` are empty.
    pub unscored: Vec<bool>,
    pub top_n: usize,
}

impl RankingMatrices {

    pub fn num_users(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_scored(&self, user: u32) -> bool {
        !self.unscored[user as usize]
    }

    pub fn scored_users(&self) -> Vec<u32> {
        (0..self.num_users() as u32)
            .filter(|user| self.is_scored(*user))
            .collect()
    }

    /// Score of the item in the given candidate slot.
    pub fn candidate_score(&self, user: u32, slot: usize) -> f64 {
        let item = self.candidates[user as usize][slot];
        self.scores[user as usize][item as usize]
    }
}

/// Asks the oracle for every user and keeps the `top_n` best items per user. Rows are
/// independent, so each one is computed by its own job on the pool.
pub fn build_ranking_matrices<O>(
    oracle: &O,
    num_users: usize,
    num_items: usize,
    top_n: usize,
    pool_size: usize,
) -> RankingMatrices
    where O: ScoringOracle + Sync {

    let build_start = Instant::now();

    let mut scores: DenseMatrix = vec![Vec::new(); num_users];
    let mut candidates: CandidateMatrix = vec![Vec::new(); num_users];
    let mut unscored = vec![false; num_users];

    let pool = Pool::new(pool_size.max(1));

    pool.scoped(|scope| {
        let rows = scores.iter_mut()
            .zip(candidates.iter_mut())
            .zip(unscored.iter_mut())
            .enumerate();

        for (user, ((score_row, candidate_row), is_unscored)) in rows {
            scope.execute(move || {
                match score_user(oracle, user as u32, num_items) {
                    Ok(user_scores) => {
                        *candidate_row = top_n_indices(&user_scores, top_n);
                        *score_row = user_scores;
                    },
                    Err(error) => {
                        tracing::debug!(%error, "Leaving user out of the run");
                        *is_unscored = true;
                    },
                }
            });
        }
    });

    pool.shutdown();

    let num_unscored = unscored.iter().filter(|is_unscored| **is_unscored).count();
    if num_unscored > 0 {
        tracing::warn!(num_unscored, "Oracle could not score some users");
    }

    tracing::info!(
        num_users,
        top_n,
        duration_ms = utils::to_millis(build_start.elapsed()),
        "Built ranking matrices"
    );

    RankingMatrices { scores, candidates, unscored, top_n }
}

fn score_user<O>(oracle: &O, user: u32, num_items: usize) -> Result<Vec<f64>, ScoringError>
    where O: ScoringOracle {

    let user_scores = oracle.score(user)?;

    if user_scores.len() != num_items {
        return Err(ScoringError::DimensionMismatch {
            user,
            expected: num_items,
            actual: user_scores.len(),
        });
    }

    Ok(user_scores)
}

#[cfg(test)]
mod tests {

    use std::collections::BinaryHeap;

    use crate::error::ScoringError;
    use crate::ranking;
    use crate::ranking::ScoredItem;

    #[test]
    fn scored_item_ordering_reversed() {
        let item_a = ScoredItem { item: 1, score: 0.5 };
        let item_b = ScoredItem { item: 2, score: 1.5 };
        let item_c = ScoredItem { item: 3, score: 0.3 };
        let item_d = ScoredItem { item: 4, score: 0.5 };

        assert!(item_a > item_b);
        assert!(item_a < item_c);
        assert!(item_b < item_c);
        assert!(item_a < item_d);
    }

    #[test]
    fn heap_keeps_weakest_on_top() {
        let mut heap = BinaryHeap::new();
        heap.push(ScoredItem { item: 1, score: 0.5 });
        heap.push(ScoredItem { item: 2, score: 0.1 });
        heap.push(ScoredItem { item: 3, score: 0.9 });

        assert_eq!(heap.peek().unwrap().item, 2);
    }

    #[test]
    fn topn() {
        let scores = [0.5, 1.5, 0.3, 3.5, 2.5];

        assert_eq!(ranking::top_n_indices(&scores, 3), vec![3, 4, 1]);
        assert_eq!(ranking::top_n_indices(&scores, 5), vec![3, 4, 1, 0, 2]);
    }

    #[test]
    fn ties_keep_native_order() {
        let scores = [0.2, 0.7, 0.7, 0.1, 0.7];

        assert_eq!(ranking::top_n_indices(&scores, 2), vec![1, 2]);
        assert_eq!(ranking::top_n_indices(&scores, 4), vec![1, 2, 4, 0]);
    }

    #[test]
    fn matrices_from_oracle() {
        let oracle = |user: u32| match user {
            0 => Ok(vec![0.9, 0.1, 0.5, 0.7]),
            1 => Ok(vec![0.1, 0.2, 0.3, 0.4]),
            2 => Err(ScoringError::CannotScore(2)),
            _ => Ok(vec![1.0]),
        };

        let matrices = ranking::build_ranking_matrices(&oracle, 4, 4, 3, 2);

        assert_eq!(matrices.num_users(), 4);
        assert_eq!(matrices.candidates[0], vec![0, 3, 2]);
        assert_eq!(matrices.candidates[1], vec![3, 2, 1]);
        assert_eq!(matrices.scores[1], vec![0.1, 0.2, 0.3, 0.4]);

        // unscored users and wrongly sized score vectors leave empty rows
        assert!(matrices.candidates[2].is_empty());
        assert!(matrices.scores[3].is_empty());
        assert_eq!(matrices.scored_users(), vec![0, 1]);

        assert!((matrices.candidate_score(0, 1) - 0.7).abs() < 1e-12);
    }
}
