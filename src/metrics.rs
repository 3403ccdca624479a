/*
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

//! Ranking quality of re-ranked lists, for the whole population or a group of users.
//!
//! Per-user metrics return `None` whenever their denominator would be zero, such users are
//! excluded from the averages instead of contributing NaN.

use fnv::FnvHashSet;

use crate::types::{PopularityCounts, SparseBinaryMatrix};
use crate::utils;

/// Decimals of the reported per-user averages.
pub const METRIC_DECIMALS: i32 = 5;
/// Decimals of the reported catalog coverage.
pub const COVERAGE_DECIMALS: i32 = 2;

/// Read-only data shared by all evaluations of a model run.
pub struct EvaluationContext<'a> {
    pub ground_truth: &'a SparseBinaryMatrix,
    pub popularity: &'a PopularityCounts,
    pub num_users: usize,
    pub num_items: usize,
    /// List length used as novelty denominator.
    pub k: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupMetrics {
    pub ndcg: f64,
    pub precision: f64,
    pub recall: f64,
    pub novelty: f64,
    /// Percentage of the catalog recommended to at least one evaluated user.
    pub coverage: f64,
    pub num_users: usize,
}

/// Fraction of the predicted items that are relevant.
pub fn precision_at_k(predicted: &[u32], relevant: &FnvHashSet<u32>) -> Option<f64> {
    if predicted.is_empty() {
        return None;
    }

    Some(num_hits(predicted, relevant) as f64 / predicted.len() as f64)
}

/// Fraction of the relevant items that are predicted.
pub fn recall_at_k(predicted: &[u32], relevant: &FnvHashSet<u32>) -> Option<f64> {
    if relevant.is_empty() {
        return None;
    }

    Some(num_hits(predicted, relevant) as f64 / relevant.len() as f64)
}

/// Binary-relevance NDCG. The first position is undiscounted, position `i > 0` is
/// discounted by `ln(i + 2)`. The ideal list has the same length with every item relevant.
pub fn ndcg_at_k(predicted: &[u32], relevant: &FnvHashSet<u32>) -> Option<f64> {
    if predicted.is_empty() {
        return None;
    }

    let dcg: f64 = predicted.iter()
        .enumerate()
        .filter(|(_, item)| relevant.contains(item))
        .map(|(position, _)| discount(position))
        .sum();

    Some(dcg / ideal_dcg(predicted.len()))
}

/// DCG of a list of the given length in which every item is relevant.
pub fn ideal_dcg(length: usize) -> f64 {
    (0..length).map(discount).sum()
}

#[inline]
fn discount(position: usize) -> f64 {
    if position == 0 {
        1.0
    } else {
        1.0 / ((position + 2) as f64).ln()
    }
}

/// `-log2(count / num_users)` of an item, zero for items without training interactions.
pub fn self_information(item: u32, popularity: &PopularityCounts, num_users: usize) -> f64 {
    match popularity.get(&item) {
        Some(count) if *count > 0 && num_users > 0 =>
            -(*count as f64 / num_users as f64).log2(),
        _ => 0.0,
    }
}

/// Summed self-information of the predicted items divided by the list length.
pub fn novelty(
    predicted: &[u32],
    popularity: &PopularityCounts,
    num_users: usize,
    k: usize,
) -> Option<f64> {
    if predicted.is_empty() || k == 0 {
        return None;
    }

    let information: f64 = predicted.iter()
        .map(|item| self_information(*item, popularity, num_users))
        .sum();

    Some(information / k as f64)
}

/// Percentage of the catalog that appears in at least one list, rounded to two decimals.
pub fn catalog_coverage<'a, I>(lists: I, catalog_size: usize) -> f64
    where I: IntoIterator<Item=&'a [u32]> {

    if catalog_size == 0 {
        return 0.0;
    }

    let mut recommended: FnvHashSet<u32> = FnvHashSet::default();
    for list in lists {
        recommended.extend(list.iter().cloned());
    }

    utils::round_to(recommended.len() as f64 / catalog_size as f64 * 100.0, COVERAGE_DECIMALS)
}

/// Averages the per-user metrics over the given users. Users without ground truth or
/// without a list are skipped entirely.
pub fn evaluate(
    recommendations: &[Vec<u32>],
    users: &[u32],
    context: &EvaluationContext,
) -> GroupMetrics {

    let mut ndcgs = Vec::with_capacity(users.len());
    let mut precisions = Vec::with_capacity(users.len());
    let mut recalls = Vec::with_capacity(users.len());
    let mut novelties = Vec::with_capacity(users.len());
    let mut evaluated_lists: Vec<&[u32]> = Vec::with_capacity(users.len());

    for user in users {
        let user_index = *user as usize;

        let relevant = match context.ground_truth.get(user_index) {
            Some(relevant) if !relevant.is_empty() => relevant,
            _ => continue,
        };

        let predicted = match recommendations.get(user_index) {
            Some(predicted) if !predicted.is_empty() => predicted.as_slice(),
            _ => continue,
        };

        let scores = (
            ndcg_at_k(predicted, relevant),
            precision_at_k(predicted, relevant),
            recall_at_k(predicted, relevant),
            novelty(predicted, context.popularity, context.num_users, context.k),
        );

        if let (Some(ndcg), Some(precision), Some(recall), Some(novelty)) = scores {
            ndcgs.push(ndcg);
            precisions.push(precision);
            recalls.push(recall);
            novelties.push(novelty);
            evaluated_lists.push(predicted);
        }
    }

    GroupMetrics {
        ndcg: utils::round_to(utils::mean(&ndcgs), METRIC_DECIMALS),
        precision: utils::round_to(utils::mean(&precisions), METRIC_DECIMALS),
        recall: utils::round_to(utils::mean(&recalls), METRIC_DECIMALS),
        novelty: utils::round_to(utils::mean(&novelties), METRIC_DECIMALS),
        coverage: catalog_coverage(evaluated_lists, context.num_items),
        num_users: ndcgs.len(),
    }
}

fn num_hits(predicted: &[u32], relevant: &FnvHashSet<u32>) -> usize {
    predicted.iter().filter(|item| relevant.contains(item)).count()
}
