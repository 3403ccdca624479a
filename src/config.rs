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

use std::fs::File;
use std::io::BufReader;
use std::time::Duration;

use serde_derive::{Deserialize, Serialize};

use crate::error::RerankError;
use crate::optimizer::{FairnessMode, FairnessOptimizer, DEFAULT_TOLERANCE};

pub const DEFAULT_TOP_N: usize = 50;
pub const DEFAULT_K: usize = 10;
pub const DEFAULT_USER_EPSILON: f64 = 0.0005;
pub const DEFAULT_ITEM_EPSILON: f64 = 0.0001;

/// Objective family, expanded into concrete modes by the epsilon grids.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ModeKind {
    #[serde(rename = "N")]
    NoFairness,
    #[serde(rename = "C")]
    ConsumerFairness,
    #[serde(rename = "P")]
    ProviderFairness,
    #[serde(rename = "CP")]
    CombinedFairness,
}

/// Parameters of a re-ranking run. Every field has a default, so a JSON file only needs to
/// name the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    /// Size of the candidate pool per user.
    pub top_n: usize,
    /// Length of the final lists.
    pub k: usize,
    /// Gain normalizer of the optimizer, `k` if absent.
    pub ideal_dcg: Option<f64>,
    pub modes: Vec<ModeKind>,
    pub user_epsilons: Vec<f64>,
    pub item_epsilons: Vec<f64>,
    /// Declare the selection variables binary instead of relaxing them to [0, 1].
    pub integral: bool,
    pub tolerance: f64,
    pub time_limit_secs: Option<f64>,
    /// Workers for building the ranking matrices, one per cpu if absent.
    pub num_threads: Option<usize>,
}

impl Default for RerankConfig {
    fn default() -> Self {
        RerankConfig {
            top_n: DEFAULT_TOP_N,
            k: DEFAULT_K,
            ideal_dcg: None,
            modes: vec![
                ModeKind::NoFairness,
                ModeKind::ConsumerFairness,
                ModeKind::ProviderFairness,
                ModeKind::CombinedFairness,
            ],
            user_epsilons: vec![DEFAULT_USER_EPSILON],
            item_epsilons: vec![DEFAULT_ITEM_EPSILON],
            integral: false,
            tolerance: DEFAULT_TOLERANCE,
            time_limit_secs: None,
            num_threads: None,
        }
    }
}

impl RerankConfig {

    pub fn from_json_file(file: &str) -> Result<Self, RerankError> {
        let reader = BufReader::new(File::open(file)?);
        let config = serde_json::from_reader(reader)?;
        Ok(config)
    }

    pub fn validate(&self, num_items: usize) -> Result<(), RerankError> {

        if self.k == 0 || self.k > self.top_n {
            return invalid(format!("k={} must be in [1, top_n={}]", self.k, self.top_n));
        }

        if self.top_n > num_items {
            return invalid(format!(
                "top_n={} exceeds the number of items ({})", self.top_n, num_items));
        }

        if !(self.tolerance > 0.0 && self.tolerance < 0.5) {
            return invalid(format!("tolerance {} must be in (0, 0.5)", self.tolerance));
        }

        let ideal_dcg = self.ideal_dcg();
        if !(ideal_dcg.is_finite() && ideal_dcg > 0.0) {
            return invalid(format!("ideal_dcg must be positive, got {}", ideal_dcg));
        }

        let epsilons = self.user_epsilons.iter().chain(self.item_epsilons.iter());
        if let Some(epsilon) = epsilons.cloned().find(|epsilon| !epsilon.is_finite()) {
            return invalid(format!("epsilon {} is not finite", epsilon));
        }

        if self.modes.is_empty() {
            return invalid(String::from("at least one fairness mode is required"));
        }

        let needs_user_epsilons = self.modes.iter().any(|kind| match kind {
            ModeKind::ConsumerFairness | ModeKind::CombinedFairness => true,
            _ => false,
        });
        if needs_user_epsilons && self.user_epsilons.is_empty() {
            return invalid(String::from("modes C and CP need at least one user epsilon"));
        }

        let needs_item_epsilons = self.modes.iter().any(|kind| match kind {
            ModeKind::ProviderFairness | ModeKind::CombinedFairness => true,
            _ => false,
        });
        if needs_item_epsilons && self.item_epsilons.is_empty() {
            return invalid(String::from("modes P and CP need at least one item epsilon"));
        }

        if let Some(seconds) = self.time_limit_secs {
            if !(seconds.is_finite() && seconds > 0.0) {
                return invalid(format!("time limit {} must be positive", seconds));
            }
        }

        if self.num_threads == Some(0) {
            return invalid(String::from("num_threads must be at least 1"));
        }

        Ok(())
    }

    pub fn ideal_dcg(&self) -> f64 {
        self.ideal_dcg.unwrap_or(self.k as f64)
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_secs
            .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
            .map(Duration::from_secs_f64)
    }

    pub fn pool_size(&self) -> usize {
        self.num_threads.unwrap_or_else(num_cpus::get)
    }

    pub fn optimizer(&self) -> FairnessOptimizer {
        FairnessOptimizer::new(self.integral, self.tolerance, self.time_limit())
    }

    /// Expands the configured modes over the epsilon grids, in configuration order.
    pub fn fairness_modes(&self) -> Vec<FairnessMode> {
        let mut modes = Vec::new();

        for kind in self.modes.iter() {
            match kind {
                ModeKind::NoFairness => modes.push(FairnessMode::NoFairness),
                ModeKind::ConsumerFairness => {
                    for user_epsilon in self.user_epsilons.iter().cloned() {
                        modes.push(FairnessMode::ConsumerFairness { user_epsilon });
                    }
                },
                ModeKind::ProviderFairness => {
                    for item_epsilon in self.item_epsilons.iter().cloned() {
                        modes.push(FairnessMode::ProviderFairness { item_epsilon });
                    }
                },
                ModeKind::CombinedFairness => {
                    for user_epsilon in self.user_epsilons.iter().cloned() {
                        for item_epsilon in self.item_epsilons.iter().cloned() {
                            modes.push(FairnessMode::CombinedFairness { user_epsilon, item_epsilon });
                        }
                    }
                },
            }
        }

        modes
    }
}

fn invalid(message: String) -> Result<(), RerankError> {
    Err(RerankError::InvalidConfiguration(message))
}

#[cfg(test)]
mod tests {

    use std::io::Write;
    use std::time::Duration;

    use tempfile::NamedTempFile;

    use crate::config::{ModeKind, RerankConfig};
    use crate::error::RerankError;
    use crate::optimizer::FairnessMode;

    #[test]
    fn defaults() {
        let config = RerankConfig::default();

        assert_eq!(config.top_n, 50);
        assert_eq!(config.k, 10);
        assert_eq!(config.ideal_dcg(), 10.0);
        assert_eq!(config.time_limit(), None);
        assert!(config.validate(100).is_ok());

        let modes = config.fairness_modes();
        assert_eq!(modes, vec![
            FairnessMode::NoFairness,
            FairnessMode::ConsumerFairness { user_epsilon: 0.0005 },
            FairnessMode::ProviderFairness { item_epsilon: 0.0001 },
            FairnessMode::CombinedFairness { user_epsilon: 0.0005, item_epsilon: 0.0001 },
        ]);
    }

    #[test]
    fn epsilon_grid() {
        let config = RerankConfig {
            modes: vec![ModeKind::CombinedFairness, ModeKind::ConsumerFairness],
            user_epsilons: vec![0.1, 0.2],
            item_epsilons: vec![0.5, 0.6, 0.7],
            ..RerankConfig::default()
        };

        let modes = config.fairness_modes();

        assert_eq!(modes.len(), 2 * 3 + 2);
        assert_eq!(modes[0], FairnessMode::CombinedFairness { user_epsilon: 0.1, item_epsilon: 0.5 });
        assert_eq!(modes[5], FairnessMode::CombinedFairness { user_epsilon: 0.2, item_epsilon: 0.7 });
        assert_eq!(modes[7], FairnessMode::ConsumerFairness { user_epsilon: 0.2 });
    }

    #[test]
    fn partial_json_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"k": 5, "top_n": 20, "modes": ["N", "CP"], "time_limit_secs": 2.5}}"#)
            .unwrap();

        let config = RerankConfig::from_json_file(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.k, 5);
        assert_eq!(config.top_n, 20);
        assert_eq!(config.modes, vec![ModeKind::NoFairness, ModeKind::CombinedFairness]);
        assert_eq!(config.item_epsilons, vec![0.0001]);
        assert_eq!(config.time_limit(), Some(Duration::from_millis(2500)));
        assert_eq!(config.ideal_dcg(), 5.0);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"modes": ["X"]}}"#).unwrap();

        match RerankConfig::from_json_file(file.path().to_str().unwrap()) {
            Err(RerankError::Json(_)) => {},
            other => panic!("expected a JSON error, got {:?}", other),
        }
    }

    #[test]
    fn validation() {
        let rejected = |config: RerankConfig, num_items: usize| match config.validate(num_items) {
            Err(RerankError::InvalidConfiguration(_)) => true,
            _ => false,
        };

        assert!(rejected(RerankConfig { k: 0, ..RerankConfig::default() }, 100));
        assert!(rejected(RerankConfig { k: 51, ..RerankConfig::default() }, 100));
        assert!(rejected(RerankConfig::default(), 49));
        assert!(rejected(RerankConfig { ideal_dcg: Some(0.0), ..RerankConfig::default() }, 100));
        assert!(rejected(RerankConfig { tolerance: 0.5, ..RerankConfig::default() }, 100));
        assert!(rejected(RerankConfig { modes: vec![], ..RerankConfig::default() }, 100));
        assert!(rejected(RerankConfig { user_epsilons: vec![f64::NAN], ..RerankConfig::default() }, 100));
        assert!(rejected(RerankConfig { item_epsilons: vec![], ..RerankConfig::default() }, 100));
        assert!(rejected(RerankConfig { num_threads: Some(0), ..RerankConfig::default() }, 100));

        let baseline_only = RerankConfig {
            modes: vec![ModeKind::NoFairness],
            user_epsilons: vec![],
            item_epsilons: vec![],
            ..RerankConfig::default()
        };
        assert!(baseline_only.validate(50).is_ok());
    }
}
