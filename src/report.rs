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
use std::io;
use std::path::Path;

use serde_derive::Serialize;

use crate::error::RerankError;
use crate::groups::{LONG_TAIL_ITEMS, SHORT_HEAD_ITEMS};
use crate::metrics::GroupMetrics;
use crate::optimizer::FairnessMode;

/// Placeholder for epsilon columns that do not apply to a mode.
pub const NOT_APPLICABLE: &str = "-";

/// Names that identify the rows of one result file.
#[derive(Debug, Clone)]
pub struct RunLabels {
    pub dataset: String,
    pub model: String,
    pub user_groups: String,
    pub item_groups: String,
}

/// One line of the result file. Field names will be used as CSV header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    #[serde(rename = "Dataset")]
    pub dataset: String,
    #[serde(rename = "Model")]
    pub model: String,
    #[serde(rename = "GUser")]
    pub user_groups: String,
    #[serde(rename = "GItem")]
    pub item_groups: String,
    #[serde(rename = "Type")]
    pub mode: String,
    #[serde(rename = "User_EPS")]
    pub user_epsilon: String,
    #[serde(rename = "Item_EPS")]
    pub item_epsilon: String,
    #[serde(rename = "ndcg_ALL")]
    pub ndcg_all: f64,
    #[serde(rename = "ndcg_ACT")]
    pub ndcg_active: f64,
    #[serde(rename = "ndcg_INACT")]
    pub ndcg_inactive: f64,
    #[serde(rename = "Pre_ALL")]
    pub precision_all: f64,
    #[serde(rename = "Pre_ACT")]
    pub precision_active: f64,
    #[serde(rename = "Pre_INACT")]
    pub precision_inactive: f64,
    #[serde(rename = "Rec_ALL")]
    pub recall_all: f64,
    #[serde(rename = "Rec_ACT")]
    pub recall_active: f64,
    #[serde(rename = "Rec_INACT")]
    pub recall_inactive: f64,
    #[serde(rename = "Nov_ALL")]
    pub novelty_all: f64,
    #[serde(rename = "Nov_ACT")]
    pub novelty_active: f64,
    #[serde(rename = "Nov_INACT")]
    pub novelty_inactive: f64,
    #[serde(rename = "Cov_ALL")]
    pub coverage_all: f64,
    #[serde(rename = "Cov_ACT")]
    pub coverage_active: f64,
    #[serde(rename = "Cov_INACT")]
    pub coverage_inactive: f64,
    #[serde(rename = "Short_Items")]
    pub short_head_items: u64,
    #[serde(rename = "Long_Items")]
    pub long_tail_items: u64,
    /// `<selected users * k>==<short + long>`
    #[serde(rename = "All_Items")]
    pub all_items: String,
}

impl ResultRow {

    pub fn new(
        labels: &RunLabels,
        mode: &FairnessMode,
        all: &GroupMetrics,
        active: &GroupMetrics,
        inactive: &GroupMetrics,
        item_group_exposure: &[f64],
        num_selected_slots: usize,
    ) -> Self {

        let exposure = |group: usize| {
            item_group_exposure.get(group).map_or(0, |count| count.round().max(0.0) as u64)
        };

        let short_head_items = exposure(SHORT_HEAD_ITEMS);
        let long_tail_items = exposure(LONG_TAIL_ITEMS);

        ResultRow {
            dataset: labels.dataset.clone(),
            model: labels.model.clone(),
            user_groups: labels.user_groups.clone(),
            item_groups: labels.item_groups.clone(),
            mode: mode.code().to_owned(),
            user_epsilon: epsilon_column(mode.user_epsilon()),
            item_epsilon: epsilon_column(mode.item_epsilon()),
            ndcg_all: all.ndcg,
            ndcg_active: active.ndcg,
            ndcg_inactive: inactive.ndcg,
            precision_all: all.precision,
            precision_active: active.precision,
            precision_inactive: inactive.precision,
            recall_all: all.recall,
            recall_active: active.recall,
            recall_inactive: inactive.recall,
            novelty_all: all.novelty,
            novelty_active: active.novelty,
            novelty_inactive: inactive.novelty,
            coverage_all: all.coverage,
            coverage_active: active.coverage,
            coverage_inactive: inactive.coverage,
            short_head_items,
            long_tail_items,
            all_items: format!("{}=={}", num_selected_slots, short_head_items + long_tail_items),
        }
    }
}

fn epsilon_column(epsilon: Option<f64>) -> String {
    match epsilon {
        Some(epsilon) => epsilon.to_string(),
        None => NOT_APPLICABLE.to_owned(),
    }
}

/// Writes result rows as CSV, the header precedes the first row.
pub struct ResultWriter<W: io::Write> {
    writer: csv::Writer<W>,
    num_rows: usize,
}

impl ResultWriter<File> {

    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, RerankError> {
        Ok(ResultWriter { writer: csv::Writer::from_path(path)?, num_rows: 0 })
    }
}

impl<W: io::Write> ResultWriter<W> {

    pub fn from_writer(out: W) -> Self {
        ResultWriter { writer: csv::Writer::from_writer(out), num_rows: 0 }
    }

    pub fn write_row(&mut self, row: &ResultRow) -> Result<(), RerankError> {
        self.writer.serialize(row)?;
        self.num_rows += 1;
        Ok(())
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn flush(&mut self) -> Result<(), RerankError> {
        self.writer.flush()?;
        Ok(())
    }
}
