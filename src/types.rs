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

use fnv::{FnvHashMap, FnvHashSet};

/// Users x items, one predicted score per item. Rows of unscored users are empty.
pub type DenseMatrix = Vec<Vec<f64>>;

/// Users x topN, item indices sorted by descending score.
pub type CandidateMatrix = Vec<Vec<u32>>;

/// Users x topN (or users x groups) binary indicators.
pub type BinaryMatrix = Vec<Vec<bool>>;

/// Users x topN x item groups, the item group(s) of every candidate slot.
pub type GroupIndicator = Vec<Vec<Vec<bool>>>;

/// One item set per user, e.g. the held-out ground truth or the training history.
pub type SparseBinaryMatrix = Vec<FnvHashSet<u32>>;

/// Number of training interactions per item.
pub type PopularityCounts = FnvHashMap<u32, u32>;

pub fn new_binary_matrix(num_rows: usize, num_columns: usize) -> BinaryMatrix {
    vec![vec![false; num_columns]; num_rows]
}

pub fn new_sparse_binary_matrix(num_rows: usize) -> SparseBinaryMatrix {
    vec![FnvHashSet::with_capacity_and_hasher(0, Default::default()); num_rows]
}

pub fn new_popularity_counts(num_items: usize) -> PopularityCounts {
    FnvHashMap::with_capacity_and_hasher(num_items, Default::default())
}
