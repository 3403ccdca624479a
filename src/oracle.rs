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

//! Sources of per-user item scores. How the scores were produced is of no concern to the
//! re-ranking; an oracle only has to return a dense score vector over all items.

use fnv::FnvHashMap;

use crate::error::{RerankError, ScoringError};
use crate::io;
use crate::stats::DataDictionary;
use crate::types::{PopularityCounts, SparseBinaryMatrix};

pub trait ScoringOracle {
    /// Predicted affinity of the user for every item, indexed by item.
    fn score(&self, user: u32) -> Result<Vec<f64>, ScoringError>;
}

impl<F> ScoringOracle for F where F: Fn(u32) -> Result<Vec<f64>, ScoringError> {
    fn score(&self, user: u32) -> Result<Vec<f64>, ScoringError> {
        self(user)
    }
}

/// Scores precomputed by an external model, read from `user item score` triples.
pub struct ScoreFileOracle {
    scores: FnvHashMap<u32, Vec<(u32, f64)>>,
    num_items: usize,
}

impl ScoreFileOracle {

    /// Triples with unknown users or items and unparseable scores are skipped.
    pub fn from_file(file: &str, data_dict: &DataDictionary) -> Result<Self, RerankError> {

        let records = io::read_fields(file)?;
        let mut scores: FnvHashMap<u32, Vec<(u32, f64)>> =
            FnvHashMap::with_capacity_and_hasher(data_dict.num_users(), Default::default());
        let mut num_skipped = 0;

        for (_, fields) in records {
            let user = fields.get(0).and_then(|user| data_dict.user_index(user));
            let item = fields.get(1).and_then(|item| data_dict.item_index(item));
            let score = fields.get(2).and_then(|score| score.parse::<f64>().ok());

            match (user, item, score) {
                (Some(user), Some(item), Some(score)) if score.is_finite() => {
                    scores.entry(user).or_insert_with(Vec::new).push((item, score));
                },
                _ => num_skipped += 1,
            }
        }

        if num_skipped > 0 {
            tracing::warn!(file, num_skipped, "Skipped score records for unknown entities");
        }

        Ok(ScoreFileOracle { scores, num_items: data_dict.num_items() })
    }
}

impl ScoringOracle for ScoreFileOracle {

    /// Items without a precomputed score get 0.0.
    fn score(&self, user: u32) -> Result<Vec<f64>, ScoringError> {
        let user_scores = self.scores.get(&user).ok_or(ScoringError::CannotScore(user))?;

        let mut dense = vec![0.0; self.num_items];
        for &(item, score) in user_scores {
            dense[item as usize] = score;
        }

        Ok(dense)
    }
}

/// Most-popular baseline: the relative training popularity of every item the user has not
/// interacted with yet.
pub struct PopularityOracle<'a> {
    popularity: Vec<f64>,
    histories: &'a SparseBinaryMatrix,
}

impl<'a> PopularityOracle<'a> {

    pub fn new(
        popularity: &PopularityCounts,
        histories: &'a SparseBinaryMatrix,
        num_items: usize,
    ) -> Self {
        let max_count = popularity.values().cloned().max().unwrap_or(1).max(1) as f64;

        let mut relative = vec![0.0; num_items];
        for (item, count) in popularity.iter() {
            relative[*item as usize] = *count as f64 / max_count;
        }

        PopularityOracle { popularity: relative, histories }
    }
}

impl<'a> ScoringOracle for PopularityOracle<'a> {

    fn score(&self, user: u32) -> Result<Vec<f64>, ScoringError> {
        let history = self.histories.get(user as usize).ok_or(ScoringError::CannotScore(user))?;

        let mut scores = self.popularity.clone();
        for item in history.iter() {
            scores[*item as usize] = 0.0;
        }

        Ok(scores)
    }
}

#[cfg(test)]
mod tests {

    use std::io::Write;

    use tempfile::NamedTempFile;

    use crate::error::ScoringError;
    use crate::io;
    use crate::oracle::{PopularityOracle, ScoreFileOracle, ScoringOracle};
    use crate::stats::DataDictionary;

    fn dictionary() -> (Vec<(String, String)>, DataDictionary) {
        let train: Vec<(String, String)> = vec![("u1", "i1"), ("u1", "i2"), ("u2", "i1"), ("u3", "i3")]
            .into_iter()
            .map(|(user, item)| (user.to_owned(), item.to_owned()))
            .collect();
        let data_dict = DataDictionary::from_interactions(train.iter().cloned());
        (train, data_dict)
    }

    #[test]
    fn closures_are_oracles() {
        let oracle = |user: u32| if user == 0 {
            Ok(vec![0.1, 0.2])
        } else {
            Err(ScoringError::CannotScore(user))
        };

        assert_eq!(oracle.score(0).unwrap(), vec![0.1, 0.2]);
        assert_eq!(oracle.score(3), Err(ScoringError::CannotScore(3)));
    }

    #[test]
    fn score_file() {
        let (_, data_dict) = dictionary();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "u1\ti2\t0.7\nu1\ti3\t0.4\nu9\ti1\t0.5\nu2\ti1\tnot-a-number\n").unwrap();

        let oracle = ScoreFileOracle::from_file(file.path().to_str().unwrap(), &data_dict).unwrap();

        assert_eq!(oracle.score(0).unwrap(), vec![0.0, 0.7, 0.4]);
        assert_eq!(oracle.score(1), Err(ScoringError::CannotScore(1)));
    }

    #[test]
    fn popularity_masks_history() {
        let (train, data_dict) = dictionary();
        let (histories, _) = io::histories_from_interactions(&train, &data_dict);
        let popularity = io::popularity_from_interactions(&train, &data_dict);

        let oracle = PopularityOracle::new(&popularity, &histories, data_dict.num_items());

        assert_eq!(oracle.score(2).unwrap(), vec![1.0, 0.5, 0.0]);
        assert_eq!(oracle.score(0).unwrap(), vec![0.0, 0.0, 0.5]);
        assert!(oracle.score(7).is_err());
    }
}
