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

//! Error types for the re-ranking pipeline.

use std::time::Duration;

use thiserror::Error;

use crate::optimizer::FairnessMode;

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum RerankError {
    /// Reading or writing a file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A CSV input or output could not be processed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// A JSON configuration or output could not be processed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// An input line does not carry a user and an item
    #[error("Malformed record in {path} at line {line}")]
    MalformedRecord { path: String, line: u64 },
    /// Parameters that cannot produce a valid selection
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// The solver did not produce a usable selection, nothing may be reported for this run
    #[error("Optimization failed for model {model} in mode {mode}: {reason}")]
    OptimizationFailed {
        model: String,
        mode: FairnessMode,
        reason: OptimizationFailure,
    },
}

/// Why a solve was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizationFailure {
    /// Infeasible, unbounded or otherwise unsolved model
    #[error("solver error: {0}")]
    Solver(String),
    #[error("no solution within {0:?}")]
    TimedOut(Duration),
    #[error("solver thread panicked")]
    SolverPanicked,
    /// A selection variable ended up strictly between 0 and 1
    #[error("non-integral selection {value} for user {user}, slot {slot}")]
    NonIntegral { user: u32, slot: usize, value: f64 },
    #[error("user {user} received {selected} items instead of the requested list length")]
    Cardinality { user: u32, selected: usize },
}

/// Raised by a scoring oracle; the affected user is left out of the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    #[error("cannot score user {0}")]
    CannotScore(u32),
    #[error("score vector for user {user} has {actual} entries, expected {expected}")]
    DimensionMismatch {
        user: u32,
        expected: usize,
        actual: usize,
    },
}
