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
use std::io::prelude::*;
use std::io::{stdout, BufReader};
use std::path::Path;

use serde_derive::Serialize;

use crate::error::RerankError;
use crate::optimizer::FairnessMode;
use crate::stats::{DataDictionary, Renaming};
use crate::types;
use crate::types::{PopularityCounts, SparseBinaryMatrix};

/// Reads a headerless input file and splits every non-blank line on ASCII whitespace, so
/// tabs, spaces and mixtures of both separate the columns. Yields the 1-based line number
/// and the fields of each line.
pub fn read_fields<P: AsRef<Path>>(file: P) -> Result<Vec<(u64, Vec<String>)>, RerankError> {
    let reader = BufReader::new(File::open(file)?);
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let fields: Vec<String> = line.split_ascii_whitespace().map(String::from).collect();

        if !fields.is_empty() {
            records.push((index as u64 + 1, fields));
        }
    }

    Ok(records)
}

/// Reads user-item(-rating) tuples, one per line. The rating and any trailing columns are
/// ignored, lines with fewer than two fields are malformed.
pub fn read_interactions(file: &str) -> Result<Vec<(String, String)>, RerankError> {
    read_fields(file)?
        .into_iter()
        .map(|(line, mut fields)| {
            if fields.len() < 2 {
                return Err(RerankError::MalformedRecord { path: file.to_owned(), line });
            }
            fields.truncate(2);
            let item = fields.pop().unwrap_or_default();
            let user = fields.pop().unwrap_or_default();
            Ok((user, item))
        })
        .collect()
}

/// Reads a group membership list with one identifier per line.
pub fn read_id_list(file: &str) -> Result<Vec<String>, RerankError> {
    let ids = read_fields(file)?
        .into_iter()
        .filter_map(|(_, fields)| fields.into_iter().next())
        .collect();

    Ok(ids)
}

/// Collects the items of every known user. Pairs referring to unknown users or items are
/// skipped, their number is returned alongside the histories.
pub fn histories_from_interactions<'a, I>(
    interactions: I,
    data_dict: &DataDictionary,
) -> (SparseBinaryMatrix, usize)
    where I: IntoIterator<Item=&'a (String, String)> {

    let mut histories = types::new_sparse_binary_matrix(data_dict.num_users());
    let mut num_skipped = 0;

    for (user, item) in interactions {
        match (data_dict.user_index(user), data_dict.item_index(item)) {
            (Some(user_index), Some(item_index)) => {
                histories[user_index as usize].insert(item_index);
            },
            _ => num_skipped += 1,
        }
    }

    (histories, num_skipped)
}

/// Counts how often every item occurs in the given interactions.
pub fn popularity_from_interactions<'a, I>(
    interactions: I,
    data_dict: &DataDictionary,
) -> PopularityCounts
    where I: IntoIterator<Item=&'a (String, String)> {

    let mut popularity = types::new_popularity_counts(data_dict.num_items());

    for (_, item) in interactions {
        if let Some(item_index) = data_dict.item_index(item) {
            *popularity.entry(item_index).or_insert(0) += 1;
        }
    }

    popularity
}

/// Struct used for JSON serialization of re-ranked lists. Field names will be used in JSON.
#[derive(Serialize)]
struct Recommendations<'a> {
    #[serde(rename = "type")]
    mode: &'a str,
    user_epsilon: Option<f64>,
    item_epsilon: Option<f64>,
    for_user: &'a str,
    recommended_items: Vec<&'a str>,
}

/// If a `path` is supplied, we write to a file at the specified path, otherwise, we output
/// to stdout.
pub fn open_output(path: Option<&str>) -> io::Result<Box<dyn Write>> {
    let out: Box<dyn Write> = match path {
        Some(path) => Box::new(File::create(&Path::new(path))?),
        _ => Box::new(stdout())
    };

    Ok(out)
}

/// Output the selected items of a run in JSON lines format, using the original identifiers
/// from the input files. Users without a list are left out.
pub fn write_recommendations<W: Write>(
    out: &mut W,
    recommendations: &[Vec<u32>],
    renaming: &Renaming,
    mode: &FairnessMode,
) -> Result<(), RerankError> {

    for (user_index, items) in recommendations.iter().enumerate() {

        if items.is_empty() {
            continue;
        }

        let line = Recommendations {
            mode: mode.code(),
            user_epsilon: mode.user_epsilon(),
            item_epsilon: mode.item_epsilon(),
            for_user: renaming.user_name(user_index as u32),
            recommended_items: items.iter()
                .map(|item_index| renaming.item_name(*item_index))
                .collect(),
        };

        writeln!(out, "{}", serde_json::to_string(&line)?)?;
    }

    Ok(())
}
