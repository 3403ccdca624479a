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

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

pub mod config;
pub mod error;
pub mod groups;
pub mod io;
pub mod metrics;
pub mod optimizer;
pub mod oracle;
pub mod ranking;
pub mod relevance;
pub mod report;
pub mod stats;
pub mod types;
pub mod utils;

mod usage_tests;

pub use crate::config::{ModeKind, RerankConfig};
pub use crate::error::{OptimizationFailure, RerankError, ScoringError};
pub use crate::optimizer::{FairnessMode, FairnessOptimizer, Selection};
pub use crate::oracle::ScoringOracle;
pub use crate::report::{ResultRow, ResultWriter, RunLabels};

use crate::groups::{ItemGroups, UserGroups, ACTIVE_USERS, INACTIVE_USERS, LONG_TAIL_ITEMS,
    SHORT_HEAD_ITEMS};
use crate::metrics::{EvaluationContext, GroupMetrics};
use crate::optimizer::{ProblemInputs, SelectionProblem};
use crate::ranking::RankingMatrices;
use crate::stats::{DataDictionary, Renaming};
use crate::types::{PopularityCounts, SparseBinaryMatrix};

/// Training and held-out interactions of a dataset, mapped to dense indices. The id mapping
/// is derived from the training interactions only.
pub struct Dataset {
    pub data_dict: DataDictionary,
    pub train: SparseBinaryMatrix,
    /// Occurrences of every item in the training interactions.
    pub popularity: PopularityCounts,
    pub ground_truth: SparseBinaryMatrix,
}

impl Dataset {

    pub fn from_files(train_file: &str, test_file: &str) -> Result<Self, RerankError> {

        tracing::info!(train_file, test_file, "Reading interactions");

        let train = io::read_interactions(train_file)?;
        let test = io::read_interactions(test_file)?;

        Ok(Dataset::from_interactions(&train, &test))
    }

    pub fn from_interactions(train: &[(String, String)], test: &[(String, String)]) -> Self {

        let data_dict = DataDictionary::from_interactions(
            train.iter().map(|(user, item)| (user.as_str(), item.as_str())));

        tracing::info!(
            num_interactions = data_dict.num_interactions(),
            num_users = data_dict.num_users(),
            num_items = data_dict.num_items(),
            "Built data dictionary from training interactions"
        );

        let (train_histories, _) = io::histories_from_interactions(train, &data_dict);
        let popularity = io::popularity_from_interactions(train, &data_dict);
        let (ground_truth, num_skipped) = io::histories_from_interactions(test, &data_dict);

        if num_skipped > 0 {
            tracing::warn!(num_skipped, "Skipped held-out interactions of unknown users or items");
        }

        Dataset { data_dict, train: train_histories, popularity, ground_truth }
    }

    pub fn num_users(&self) -> usize {
        self.data_dict.num_users()
    }

    pub fn num_items(&self) -> usize {
        self.data_dict.num_items()
    }

    pub fn renaming(&self) -> Renaming {
        Renaming::from(&self.data_dict)
    }
}

/// The user partition (inactive, active) and the item partition (short head, long tail).
pub struct Partitions {
    pub user_groups: UserGroups,
    pub item_groups: ItemGroups,
}

impl Partitions {

    pub fn from_files(
        inactive_users: &str,
        active_users: &str,
        short_head_items: &str,
        long_tail_items: &str,
        dataset: &Dataset,
    ) -> Result<Self, RerankError> {

        let mut user_files = [""; 2];
        user_files[INACTIVE_USERS] = inactive_users;
        user_files[ACTIVE_USERS] = active_users;

        let mut item_files = [""; 2];
        item_files[SHORT_HEAD_ITEMS] = short_head_items;
        item_files[LONG_TAIL_ITEMS] = long_tail_items;

        Ok(Partitions {
            user_groups: UserGroups::from_files(&user_files, &dataset.data_dict)?,
            item_groups: ItemGroups::from_files(&item_files, &dataset.data_dict)?,
        })
    }
}

/// Result of re-ranking with one fairness mode.
#[derive(Debug)]
pub struct RunOutcome {
    pub selection: Selection,
    /// Selected items per user, empty for users outside of the run.
    pub recommendations: Vec<Vec<u32>>,
    pub row: ResultRow,
}

/// Matrices and optimizer inputs of one scoring model, shared by all of its fairness runs.
pub struct ModelRun<'a> {
    labels: RunLabels,
    dataset: &'a Dataset,
    partitions: &'a Partitions,
    matrices: RankingMatrices,
    problem: Arc<SelectionProblem>,
}

impl<'a> ModelRun<'a> {

    /// Scores all users, selects their candidates and marks relevant and grouped slots.
    pub fn prepare<O>(
        labels: RunLabels,
        oracle: &O,
        dataset: &'a Dataset,
        partitions: &'a Partitions,
        config: &RerankConfig,
    ) -> Result<Self, RerankError>
        where O: ScoringOracle + Sync {

        config.validate(dataset.num_items())?;

        let prepare_start = Instant::now();

        let matrices = ranking::build_ranking_matrices(
            oracle,
            dataset.num_users(),
            dataset.num_items(),
            config.top_n,
            config.pool_size(),
        );

        let relevance = relevance::build_relevance_matrix(&matrices.candidates, &dataset.ground_truth);
        let candidate_groups = partitions.item_groups.candidate_groups(&matrices.candidates);

        let num_users_with_hits = relevance::hits_per_user(&relevance).iter()
            .filter(|num_hits| **num_hits > 0)
            .count();

        let inputs = ProblemInputs {
            matrices: &matrices,
            relevance: &relevance,
            candidate_groups: &candidate_groups,
            num_item_groups: partitions.item_groups.0.num_groups(),
            user_groups: &partitions.user_groups,
            train: &dataset.train,
        };

        let problem = SelectionProblem::new(&labels.model, inputs, config.k, config.ideal_dcg())?;

        tracing::info!(
            model = labels.model.as_str(),
            num_users = problem.users.len(),
            top_n = config.top_n,
            k = config.k,
            num_users_with_hits,
            duration_ms = utils::to_millis(prepare_start.elapsed()),
            "Prepared model run"
        );

        Ok(ModelRun { labels, dataset, partitions, matrices, problem: Arc::new(problem) })
    }

    pub fn problem(&self) -> &SelectionProblem {
        &self.problem
    }

    /// Solves one fairness mode and evaluates its lists for all, active and inactive users.
    pub fn run(&self, mode: FairnessMode, config: &RerankConfig) -> Result<RunOutcome, RerankError> {

        let selection = config.optimizer().optimize(&self.problem, mode)?;
        let recommendations = selection.selected_items(&self.matrices.candidates);

        let context = EvaluationContext {
            ground_truth: &self.dataset.ground_truth,
            popularity: &self.dataset.popularity,
            num_users: self.dataset.num_users(),
            num_items: self.dataset.num_items(),
            k: self.problem.k,
        };

        let user_membership = &self.partitions.user_groups.0;
        let everybody: Vec<u32> = (0..self.dataset.num_users() as u32).collect();

        let evaluate = |users: &[u32]| -> GroupMetrics {
            metrics::evaluate(&recommendations, users, &context)
        };

        let all = evaluate(everybody.as_slice());
        let active = evaluate(user_membership.members(ACTIVE_USERS).as_slice());
        let inactive = evaluate(user_membership.members(INACTIVE_USERS).as_slice());

        tracing::info!(
            model = self.labels.model.as_str(),
            %mode,
            ndcg = all.ndcg,
            ndcg_active = active.ndcg,
            ndcg_inactive = inactive.ndcg,
            num_evaluated_users = all.num_users,
            "Evaluated selection"
        );

        let row = ResultRow::new(
            &self.labels,
            &mode,
            &all,
            &active,
            &inactive,
            &selection.item_group_exposure,
            selection.num_selected_users * self.problem.k,
        );

        Ok(RunOutcome { selection, recommendations, row })
    }
}

/// Runs every configured fairness mode and writes one result row per mode. A failed solve
/// stops the iteration before its row is written. The selected lists of each run are
/// optionally written as JSON lines.
pub fn run_all<W: Write>(
    model_run: &ModelRun,
    config: &RerankConfig,
    results: &mut ResultWriter<W>,
    mut recommendations_out: Option<&mut dyn Write>,
) -> Result<Vec<ResultRow>, RerankError> {

    let renaming = if recommendations_out.is_some() {
        Some(model_run.dataset.renaming())
    } else {
        None
    };

    let modes = config.fairness_modes();
    let mut rows = Vec::with_capacity(modes.len());

    for mode in modes {
        let outcome = model_run.run(mode, config)?;

        results.write_row(&outcome.row)?;

        if let (Some(out), Some(renaming)) = (recommendations_out.as_mut(), renaming.as_ref()) {
            io::write_recommendations(out, &outcome.recommendations, renaming, &mode)?;
        }

        rows.push(outcome.row);
    }

    results.flush()?;

    tracing::info!(
        model = model_run.labels.model.as_str(),
        num_rows = rows.len(),
        "Wrote result rows"
    );

    Ok(rows)
}
