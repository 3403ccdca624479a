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

//! Fairness-constrained selection of `k` out of `top_n` candidates per user.
//!
//! For every user `i` and candidate slot `j` a selection variable `W[i][j]` in [0, 1] is
//! created. The linear program
//!
//! ```text
//! maximise   sum_ij S[i][P[i][j]] * W[i][j]  -  fairness penalties
//! subject to sum_j W[i][j]                      == k           for every user
//!            user_dcg[i]  == sum_j W[i][j] * Ahelp[i][j]
//!            user_ndcg[i] == user_dcg[i] / ideal_dcg
//!            user_precision[i] == user_dcg[i] / k
//!            user_recall[i]    == user_dcg[i] / |train[i]|      (users with training data)
//!            group_ndcg[g] == sum_{i in g} user_dcg[i]          (likewise precision, recall)
//!            item_group[g] == sum_ij W[i][j] * Ihelp[i][j][g]
//! ```
//!
//! has integral optimal vertices, as the per-user cardinality rows form a totally unimodular
//! system and all penalties are linear in `W`. The optimizer still checks every solution for
//! integrality and rejects fractional ones.

use std::fmt;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use good_lp::solvers::microlp::microlp;
use good_lp::{constraint, variable, Expression, ProblemVariables, Solution, SolverModel, Variable};

use crate::error::{OptimizationFailure, RerankError};
use crate::groups::{UserGroups, ACTIVE_USERS, INACTIVE_USERS, LONG_TAIL_ITEMS, SHORT_HEAD_ITEMS};
use crate::ranking::RankingMatrices;
use crate::types::{BinaryMatrix, CandidateMatrix, GroupIndicator, SparseBinaryMatrix};
use crate::utils;

pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Which fairness penalties enter the objective, together with their strengths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FairnessMode {
    /// Maximise the total score of the selected candidates.
    NoFairness,
    /// Penalise the gain advantage of the active users over the inactive users.
    ConsumerFairness { user_epsilon: f64 },
    /// Penalise the exposure advantage of short-head items over long-tail items.
    ProviderFairness { item_epsilon: f64 },
    /// Apply both penalties at once.
    CombinedFairness { user_epsilon: f64, item_epsilon: f64 },
}

impl FairnessMode {

    /// Short code used in reports.
    pub fn code(&self) -> &'static str {
        match self {
            FairnessMode::NoFairness => "N",
            FairnessMode::ConsumerFairness { .. } => "C",
            FairnessMode::ProviderFairness { .. } => "P",
            FairnessMode::CombinedFairness { .. } => "CP",
        }
    }

    pub fn user_epsilon(&self) -> Option<f64> {
        match *self {
            FairnessMode::ConsumerFairness { user_epsilon } |
            FairnessMode::CombinedFairness { user_epsilon, .. } => Some(user_epsilon),
            _ => None,
        }
    }

    pub fn item_epsilon(&self) -> Option<f64> {
        match *self {
            FairnessMode::ProviderFairness { item_epsilon } |
            FairnessMode::CombinedFairness { item_epsilon, .. } => Some(item_epsilon),
            _ => None,
        }
    }
}

impl fmt::Display for FairnessMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FairnessMode::NoFairness => write!(f, "N"),
            FairnessMode::ConsumerFairness { user_epsilon } =>
                write!(f, "C(user_epsilon={})", user_epsilon),
            FairnessMode::ProviderFairness { item_epsilon } =>
                write!(f, "P(item_epsilon={})", item_epsilon),
            FairnessMode::CombinedFairness { user_epsilon, item_epsilon } =>
                write!(f, "CP(user_epsilon={}, item_epsilon={})", user_epsilon, item_epsilon),
        }
    }
}

/// Borrowed inputs of one model, see [`SelectionProblem::new`].
pub struct ProblemInputs<'a> {
    pub matrices: &'a RankingMatrices,
    pub relevance: &'a BinaryMatrix,
    pub candidate_groups: &'a GroupIndicator,
    pub num_item_groups: usize,
    pub user_groups: &'a UserGroups,
    pub train: &'a SparseBinaryMatrix,
}

/// Owned, compact form of the optimizer inputs. Only scored users take part; row `r` of
/// every per-user field belongs to user `users[r]`.
#[derive(Debug, Clone)]
pub struct SelectionProblem {
    pub model: String,
    pub k: usize,
    pub top_n: usize,
    /// Constant normalizer of the per-user gain, identical for all users.
    pub ideal_dcg: f64,
    pub num_users: usize,
    pub users: Vec<u32>,
    /// Scores of the candidate items, `S[i][P[i][j]]`.
    pub candidate_scores: Vec<Vec<f64>>,
    pub relevance: BinaryMatrix,
    pub candidate_groups: GroupIndicator,
    pub user_groups: BinaryMatrix,
    pub train_sizes: Vec<usize>,
    pub num_user_groups: usize,
    pub num_item_groups: usize,
}

impl SelectionProblem {

    pub fn new(
        model: &str,
        inputs: ProblemInputs,
        k: usize,
        ideal_dcg: f64,
    ) -> Result<Self, RerankError> {

        let matrices = inputs.matrices;
        let top_n = matrices.top_n;

        if k == 0 || k > top_n {
            return Err(RerankError::InvalidConfiguration(
                format!("list length k={} must be in [1, top_n={}]", k, top_n)));
        }

        if !(ideal_dcg.is_finite() && ideal_dcg > 0.0) {
            return Err(RerankError::InvalidConfiguration(
                format!("ideal DCG must be positive, got {}", ideal_dcg)));
        }

        let users = matrices.scored_users();

        if users.is_empty() {
            return Err(RerankError::InvalidConfiguration(
                String::from("the oracle could not score a single user")));
        }

        let mut candidate_scores = Vec::with_capacity(users.len());
        let mut relevance = Vec::with_capacity(users.len());
        let mut candidate_groups = Vec::with_capacity(users.len());
        let mut user_groups = Vec::with_capacity(users.len());
        let mut train_sizes = Vec::with_capacity(users.len());

        let user_membership = &inputs.user_groups.0;

        for user in users.iter().cloned() {
            let user_index = user as usize;
            let num_candidates = matrices.candidates[user_index].len();

            if num_candidates < k {
                return Err(RerankError::InvalidConfiguration(format!(
                    "user {} has only {} candidates for lists of length {}",
                    user, num_candidates, k)));
            }

            candidate_scores.push(
                (0..num_candidates).map(|slot| matrices.candidate_score(user, slot)).collect());

            relevance.push(inputs.relevance[user_index].clone());
            candidate_groups.push(inputs.candidate_groups[user_index].clone());

            user_groups.push(
                (0..user_membership.num_groups())
                    .map(|group| user_membership.contains(user, group))
                    .collect());

            train_sizes.push(inputs.train.get(user_index).map(|items| items.len()).unwrap_or(0));
        }

        let num_without_training = train_sizes.iter().filter(|size| **size == 0).count();
        if num_without_training > 0 {
            tracing::warn!(num_without_training, "Users without training data get no recall term");
        }

        Ok(SelectionProblem {
            model: model.to_owned(),
            k,
            top_n,
            ideal_dcg,
            num_users: matrices.num_users(),
            users,
            candidate_scores,
            relevance,
            candidate_groups,
            user_groups,
            train_sizes,
            num_user_groups: user_membership.num_groups(),
            num_item_groups: inputs.num_item_groups,
        })
    }

    fn check_mode(&self, mode: FairnessMode) -> Result<(), RerankError> {

        let epsilons = [mode.user_epsilon(), mode.item_epsilon()];
        if epsilons.iter().flatten().any(|epsilon| !epsilon.is_finite()) {
            return Err(RerankError::InvalidConfiguration(
                format!("non-finite epsilon in mode {}", mode)));
        }

        if mode.user_epsilon().is_some() && self.num_user_groups < 2 {
            return Err(RerankError::InvalidConfiguration(format!(
                "mode {} needs two user groups, {} declared", mode, self.num_user_groups)));
        }

        if mode.item_epsilon().is_some() && self.num_item_groups < 2 {
            return Err(RerankError::InvalidConfiguration(format!(
                "mode {} needs two item groups, {} declared", mode, self.num_item_groups)));
        }

        Ok(())
    }
}

/// Solved selection of one (model, mode) run.
#[derive(Debug, Clone)]
pub struct Selection {
    pub mode: FairnessMode,
    /// W: users x top_n, rows of users outside of the run are empty.
    pub weights: BinaryMatrix,
    /// Number of selected slots per item group.
    pub item_group_exposure: Vec<f64>,
    /// Sum of the per-user gains per user group.
    pub user_group_gain: Vec<f64>,
    pub user_group_precision: Vec<f64>,
    pub user_group_recall: Vec<f64>,
    /// Total score of the selected candidates.
    pub total_score: f64,
    pub objective: f64,
    pub num_selected_users: usize,
}

impl Selection {

    /// Selected item ids per user, in candidate order.
    pub fn selected_items(&self, candidates: &CandidateMatrix) -> Vec<Vec<u32>> {
        self.weights.iter()
            .zip(candidates.iter())
            .map(|(row, user_candidates)| {
                row.iter()
                    .zip(user_candidates.iter())
                    .filter(|(is_selected, _)| **is_selected)
                    .map(|(_, item)| *item)
                    .collect()
            })
            .collect()
    }

    /// Gain of the active users minus gain of the inactive users.
    pub fn user_gain_disparity(&self) -> f64 {
        match (self.user_group_gain.get(ACTIVE_USERS), self.user_group_gain.get(INACTIVE_USERS)) {
            (Some(active), Some(inactive)) => active - inactive,
            _ => 0.0,
        }
    }

    pub fn num_selected_slots(&self) -> usize {
        self.weights.iter()
            .map(|row| row.iter().filter(|is_selected| **is_selected).count())
            .sum()
    }
}

/// Builds and solves one linear program per call; nothing is shared between calls.
#[derive(Debug, Clone)]
pub struct FairnessOptimizer {
    integral: bool,
    tolerance: f64,
    time_limit: Option<Duration>,
}

impl Default for FairnessOptimizer {
    fn default() -> Self {
        FairnessOptimizer { integral: false, tolerance: DEFAULT_TOLERANCE, time_limit: None }
    }
}

impl FairnessOptimizer {

    pub fn new(integral: bool, tolerance: f64, time_limit: Option<Duration>) -> Self {
        FairnessOptimizer { integral, tolerance, time_limit }
    }

    /// Solves the selection problem for one fairness mode. Any solver failure, timeout or
    /// non-integral solution is reported as [`RerankError::OptimizationFailed`].
    pub fn optimize(
        &self,
        problem: &Arc<SelectionProblem>,
        mode: FairnessMode,
    ) -> Result<Selection, RerankError> {

        problem.check_mode(mode)?;

        let solve_start = Instant::now();

        let failed = |reason: OptimizationFailure| RerankError::OptimizationFailed {
            model: problem.model.clone(),
            mode,
            reason,
        };

        let raw = self.solve_within_limit(problem, mode).map_err(&failed)?;
        let weights = verify_selection(problem, &raw.weights, self.tolerance).map_err(&failed)?;

        tracing::debug!(
            model = problem.model.as_str(),
            %mode,
            num_variables = raw.num_variables,
            num_constraints = raw.num_constraints,
            "Solved selection model"
        );

        let mut total_score = 0.0;
        let mut full_weights: BinaryMatrix = vec![Vec::new(); problem.num_users];

        for (row, selected) in weights.into_iter().enumerate() {
            for (slot, is_selected) in selected.iter().enumerate() {
                if *is_selected {
                    total_score += problem.candidate_scores[row][slot];
                }
            }
            full_weights[problem.users[row] as usize] = selected;
        }

        let objective = total_score
            - mode.user_epsilon().map_or(0.0, |epsilon| epsilon * gain_disparity(&raw.group_gain))
            - mode.item_epsilon().map_or(0.0, |epsilon| epsilon * exposure_disparity(&raw.item_group));

        tracing::info!(
            model = problem.model.as_str(),
            %mode,
            objective,
            duration_ms = utils::to_millis(solve_start.elapsed()),
            "Optimized selection"
        );

        Ok(Selection {
            mode,
            weights: full_weights,
            item_group_exposure: raw.item_group,
            user_group_gain: raw.group_gain,
            user_group_precision: raw.group_precision,
            user_group_recall: raw.group_recall,
            total_score,
            objective,
            num_selected_users: problem.users.len(),
        })
    }

    fn solve_within_limit(
        &self,
        problem: &Arc<SelectionProblem>,
        mode: FairnessMode,
    ) -> Result<RawSolution, OptimizationFailure> {

        let limit = match self.time_limit {
            Some(limit) => limit,
            None => return catch_solver_panic(|| solve_model(problem, mode, self.integral)),
        };

        let (sender, receiver) = mpsc::channel();
        let problem = Arc::clone(problem);
        let integral = self.integral;

        // An abandoned solve runs to completion in the background, its result is dropped.
        thread::Builder::new()
            .name(String::from("fairness-solver"))
            .spawn(move || {
                let _ = sender.send(catch_solver_panic(|| solve_model(&problem, mode, integral)));
            })
            .map_err(|error| OptimizationFailure::Solver(error.to_string()))?;

        match receiver.recv_timeout(limit) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(OptimizationFailure::TimedOut(limit)),
            Err(RecvTimeoutError::Disconnected) => Err(OptimizationFailure::SolverPanicked),
        }
    }
}

/// A panic inside the solver becomes [`OptimizationFailure::SolverPanicked`].
fn catch_solver_panic<T, F>(solve: F) -> Result<T, OptimizationFailure>
    where F: FnOnce() -> Result<T, OptimizationFailure> {

    panic::catch_unwind(AssertUnwindSafe(solve))
        .unwrap_or(Err(OptimizationFailure::SolverPanicked))
}

/// Variable values read back from the solver.
struct RawSolution {
    weights: Vec<Vec<f64>>,
    group_gain: Vec<f64>,
    group_precision: Vec<f64>,
    group_recall: Vec<f64>,
    item_group: Vec<f64>,
    num_variables: usize,
    num_constraints: usize,
}

fn gain_disparity(group_gain: &[f64]) -> f64 {
    group_gain[ACTIVE_USERS] - group_gain[INACTIVE_USERS]
}

fn exposure_disparity(item_group: &[f64]) -> f64 {
    item_group[SHORT_HEAD_ITEMS] - item_group[LONG_TAIL_ITEMS]
}

fn solve_model(
    problem: &SelectionProblem,
    mode: FairnessMode,
    integral: bool,
) -> Result<RawSolution, OptimizationFailure> {

    let mut vars = ProblemVariables::new();
    let num_rows = problem.users.len();

    let selection_variable = || if integral {
        variable().binary()
    } else {
        variable().min(0.0).max(1.0)
    };

    let weights: Vec<Vec<Variable>> = problem.candidate_scores.iter()
        .map(|row| row.iter().map(|_| vars.add(selection_variable())).collect())
        .collect();

    let user_dcg = vars.add_vector(variable().min(0.0), num_rows);
    let user_ndcg = vars.add_vector(variable().min(0.0), num_rows);
    let user_precision = vars.add_vector(variable().min(0.0), num_rows);
    let user_recall: Vec<Option<Variable>> = problem.train_sizes.iter()
        .map(|size| if *size > 0 { Some(vars.add(variable().min(0.0))) } else { None })
        .collect();

    let group_gain = vars.add_vector(variable().min(0.0), problem.num_user_groups);
    let group_precision = vars.add_vector(variable().min(0.0), problem.num_user_groups);
    let group_recall = vars.add_vector(variable().min(0.0), problem.num_user_groups);
    let item_group = vars.add_vector(variable().min(0.0), problem.num_item_groups);

    let num_selection_variables: usize = weights.iter().map(|row| row.len()).sum();
    let num_variables = num_selection_variables
        + 3 * num_rows
        + user_recall.iter().flatten().count()
        + 3 * problem.num_user_groups
        + problem.num_item_groups;

    // Scores are indexed by the item in each slot, see SelectionProblem::candidate_scores.
    let mut objective = Expression::default();
    for (row, scores) in weights.iter().zip(problem.candidate_scores.iter()) {
        for (weight, score) in row.iter().zip(scores.iter()) {
            objective += *weight * *score;
        }
    }

    match mode {
        FairnessMode::NoFairness => {},
        FairnessMode::ConsumerFairness { user_epsilon } => {
            penalize_gain_disparity(&mut objective, &group_gain, user_epsilon);
        },
        FairnessMode::ProviderFairness { item_epsilon } => {
            penalize_exposure_disparity(&mut objective, &item_group, item_epsilon);
        },
        FairnessMode::CombinedFairness { user_epsilon, item_epsilon } => {
            penalize_gain_disparity(&mut objective, &group_gain, user_epsilon);
            penalize_exposure_disparity(&mut objective, &item_group, item_epsilon);
        },
    }

    let mut model = vars.maximise(objective).using(microlp);
    let mut num_constraints = 0;

    let list_length = problem.k as f64;
    let inverse_ideal_dcg = 1.0 / problem.ideal_dcg;
    let inverse_list_length = 1.0 / list_length;

    for row in 0..num_rows {
        let mut cardinality = Expression::default();
        let mut gain = Expression::default();

        for (slot, weight) in weights[row].iter().enumerate() {
            cardinality += *weight;
            if problem.relevance[row][slot] {
                gain += *weight;
            }
        }

        let dcg = user_dcg[row];
        let normalized_gain = dcg * inverse_ideal_dcg;
        let precision = dcg * inverse_list_length;

        model = model
            .with(constraint!(cardinality == list_length))
            .with(constraint!(dcg == gain))
            .with(constraint!(user_ndcg[row] == normalized_gain))
            .with(constraint!(user_precision[row] == precision));
        num_constraints += 4;

        if let Some(recall_variable) = user_recall[row] {
            let recall = dcg * (1.0 / problem.train_sizes[row] as f64);
            model = model.with(constraint!(recall_variable == recall));
            num_constraints += 1;
        }
    }

    for group in 0..problem.num_user_groups {
        let mut gain_sum = Expression::default();
        let mut precision_sum = Expression::default();
        let mut recall_sum = Expression::default();

        for row in 0..num_rows {
            if problem.user_groups[row][group] {
                gain_sum += user_dcg[row];
                precision_sum += user_precision[row];
                if let Some(recall_variable) = user_recall[row] {
                    recall_sum += recall_variable;
                }
            }
        }

        model = model
            .with(constraint!(group_gain[group] == gain_sum))
            .with(constraint!(group_precision[group] == precision_sum))
            .with(constraint!(group_recall[group] == recall_sum));
        num_constraints += 3;
    }

    for group in 0..problem.num_item_groups {
        let mut exposure = Expression::default();

        for (row, row_weights) in weights.iter().enumerate() {
            for (slot, weight) in row_weights.iter().enumerate() {
                if problem.candidate_groups[row][slot].get(group).cloned().unwrap_or(false) {
                    exposure += *weight;
                }
            }
        }

        model = model.with(constraint!(item_group[group] == exposure));
        num_constraints += 1;
    }

    let solution = model.solve()
        .map_err(|error| OptimizationFailure::Solver(error.to_string()))?;

    let values = |variables: &[Variable]| -> Vec<f64> {
        variables.iter().map(|variable| solution.value(*variable)).collect()
    };

    Ok(RawSolution {
        weights: weights.iter().map(|row| values(row.as_slice())).collect(),
        group_gain: values(group_gain.as_slice()),
        group_precision: values(group_precision.as_slice()),
        group_recall: values(group_recall.as_slice()),
        item_group: values(item_group.as_slice()),
        num_variables,
        num_constraints,
    })
}

/// objective -= epsilon * (group_gain[active] - group_gain[inactive])
fn penalize_gain_disparity(objective: &mut Expression, group_gain: &[Variable], epsilon: f64) {
    *objective += group_gain[ACTIVE_USERS] * -epsilon;
    *objective += group_gain[INACTIVE_USERS] * epsilon;
}

/// objective -= epsilon * (item_group[short_head] - item_group[long_tail])
fn penalize_exposure_disparity(objective: &mut Expression, item_group: &[Variable], epsilon: f64) {
    *objective += item_group[SHORT_HEAD_ITEMS] * -epsilon;
    *objective += item_group[LONG_TAIL_ITEMS] * epsilon;
}

/// Rounds the relaxed solution to 0/1 and checks it against the list length.
fn verify_selection(
    problem: &SelectionProblem,
    weights: &[Vec<f64>],
    tolerance: f64,
) -> Result<BinaryMatrix, OptimizationFailure> {

    let mut selection = Vec::with_capacity(weights.len());

    for (row, values) in weights.iter().enumerate() {
        let user = problem.users[row];
        let mut selected = Vec::with_capacity(values.len());

        for (slot, value) in values.iter().enumerate() {
            if value.abs() <= tolerance {
                selected.push(false);
            } else if (value - 1.0).abs() <= tolerance {
                selected.push(true);
            } else {
                return Err(OptimizationFailure::NonIntegral { user, slot, value: *value });
            }
        }

        let num_selected = selected.iter().filter(|is_selected| **is_selected).count();
        if num_selected != problem.k {
            return Err(OptimizationFailure::Cardinality { user, selected: num_selected });
        }

        selection.push(selected);
    }

    Ok(selection)
}
