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

//! Group memberships of users and items. Both partitions come as lists of external ids, one
//! list per group, and ids outside of the training population are skipped.

use crate::error::RerankError;
use crate::io;
use crate::stats::DataDictionary;
use crate::types;
use crate::types::{BinaryMatrix, CandidateMatrix, GroupIndicator};

/// User group whose ranking quality is expected to be lower.
pub const INACTIVE_USERS: usize = 0;
/// User group expected to be advantaged.
pub const ACTIVE_USERS: usize = 1;

/// Popular items, whose over-exposure is penalized.
pub const SHORT_HEAD_ITEMS: usize = 0;
pub const LONG_TAIL_ITEMS: usize = 1;

/// Rows are entities (users or items), columns are groups.
#[derive(Debug, Clone)]
pub struct Membership {
    matrix: BinaryMatrix,
    num_groups: usize,
}

impl Membership {

    pub fn new(num_entities: usize, num_groups: usize) -> Self {
        Membership { matrix: types::new_binary_matrix(num_entities, num_groups), num_groups }
    }

    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    pub fn contains(&self, entity: u32, group: usize) -> bool {
        self.matrix.get(entity as usize)
            .and_then(|groups| groups.get(group))
            .cloned()
            .unwrap_or(false)
    }

    /// Groups the entity belongs to, in group order.
    pub fn groups_of(&self, entity: u32) -> Vec<usize> {
        (0..self.num_groups)
            .filter(|group| self.contains(entity, *group))
            .collect()
    }

    pub fn members(&self, group: usize) -> Vec<u32> {
        (0..self.matrix.len() as u32)
            .filter(|entity| self.contains(*entity, group))
            .collect()
    }

    /// Adds already mapped indices to a group, indices out of range are ignored.
    pub fn assign_indices(&mut self, group: usize, entities: &[u32]) {
        for entity in entities {
            if let Some(row) = self.matrix.get_mut(*entity as usize) {
                row[group] = true;
            }
        }
    }
}

/// U: users x user groups.
#[derive(Debug, Clone)]
pub struct UserGroups(pub Membership);

/// I: items x item groups.
#[derive(Debug, Clone)]
pub struct ItemGroups(pub Membership);

impl UserGroups {

    pub fn new(num_users: usize, num_groups: usize) -> Self {
        UserGroups(Membership::new(num_users, num_groups))
    }

    /// Returns the number of ids that are unknown to the dictionary.
    pub fn assign<I, S>(&mut self, group: usize, ids: I, data_dict: &DataDictionary) -> usize
        where I: IntoIterator<Item=S>, S: AsRef<str> {

        assign_mapped(&mut self.0, group, ids, |id| data_dict.user_index(id))
    }

    /// Reads one membership list per group, the first file describes group 0.
    pub fn from_files(files: &[&str], data_dict: &DataDictionary) -> Result<Self, RerankError> {
        let mut user_groups = UserGroups::new(data_dict.num_users(), files.len());

        for (group, file) in files.iter().enumerate() {
            let ids = io::read_id_list(file)?;
            let num_skipped = user_groups.assign(group, &ids, data_dict);
            log_skipped(file, group, ids.len(), num_skipped);
        }

        Ok(user_groups)
    }
}

impl ItemGroups {

    pub fn new(num_items: usize, num_groups: usize) -> Self {
        ItemGroups(Membership::new(num_items, num_groups))
    }

    pub fn assign<I, S>(&mut self, group: usize, ids: I, data_dict: &DataDictionary) -> usize
        where I: IntoIterator<Item=S>, S: AsRef<str> {

        assign_mapped(&mut self.0, group, ids, |id| data_dict.item_index(id))
    }

    pub fn from_files(files: &[&str], data_dict: &DataDictionary) -> Result<Self, RerankError> {
        let mut item_groups = ItemGroups::new(data_dict.num_items(), files.len());

        for (group, file) in files.iter().enumerate() {
            let ids = io::read_id_list(file)?;
            let num_skipped = item_groups.assign(group, &ids, data_dict);
            log_skipped(file, group, ids.len(), num_skipped);
        }

        Ok(item_groups)
    }

    /// Ihelp: the item groups of every candidate slot. Candidates in none of the groups get
    /// an all-false row.
    pub fn candidate_groups(&self, candidates: &CandidateMatrix) -> GroupIndicator {
        let membership = &self.0;

        candidates.iter()
            .map(|user_candidates| {
                user_candidates.iter()
                    .map(|item| {
                        (0..membership.num_groups())
                            .map(|group| membership.contains(*item, group))
                            .collect()
                    })
                    .collect()
            })
            .collect()
    }
}

fn assign_mapped<I, S, F>(membership: &mut Membership, group: usize, ids: I, index_of: F) -> usize
    where I: IntoIterator<Item=S>, S: AsRef<str>, F: Fn(&str) -> Option<u32> {

    let mut num_skipped = 0;

    for id in ids {
        match index_of(id.as_ref()) {
            Some(index) => membership.assign_indices(group, &[index]),
            None => num_skipped += 1,
        }
    }

    num_skipped
}

fn log_skipped(file: &str, group: usize, num_ids: usize, num_skipped: usize) {
    if num_skipped > 0 {
        tracing::warn!(file, group, num_ids, num_skipped, "Skipped unknown ids in group file");
    } else {
        tracing::info!(file, group, num_ids, "Read group file");
    }
}

#[cfg(test)]
mod tests {

    use std::io::Write;

    use tempfile::NamedTempFile;

    use crate::groups::{ItemGroups, UserGroups, ACTIVE_USERS, INACTIVE_USERS};
    use crate::stats::DataDictionary;

    fn data_dict() -> DataDictionary {
        DataDictionary::from_interactions(vec![
            ("u0", "i0"), ("u1", "i1"), ("u2", "i2"), ("u2", "i3"),
        ])
    }

    #[test]
    fn unknown_users_are_skipped() {
        let data_dict = data_dict();
        let mut user_groups = UserGroups::new(data_dict.num_users(), 2);

        let num_skipped = user_groups.assign(ACTIVE_USERS, vec!["u2", "stranger"], &data_dict);
        user_groups.assign(INACTIVE_USERS, vec!["u0", "u1"], &data_dict);

        assert_eq!(num_skipped, 1);
        assert_eq!(user_groups.0.members(ACTIVE_USERS), vec![2]);
        assert_eq!(user_groups.0.members(INACTIVE_USERS), vec![0, 1]);
        assert_eq!(user_groups.0.groups_of(2), vec![ACTIVE_USERS]);
        assert!(!user_groups.0.contains(17, ACTIVE_USERS));
    }

    #[test]
    fn candidates_without_group_get_empty_rows() {
        let data_dict = data_dict();
        let mut item_groups = ItemGroups::new(data_dict.num_items(), 2);

        item_groups.assign(0, vec!["i0", "i1"], &data_dict);
        item_groups.assign(1, vec!["i2"], &data_dict);

        let indicator = item_groups.candidate_groups(&vec![vec![2, 0, 3], vec![]]);

        assert_eq!(indicator[0][0], vec![false, true]);
        assert_eq!(indicator[0][1], vec![true, false]);
        assert_eq!(indicator[0][2], vec![false, false]);
        assert!(indicator[1].is_empty());
    }

    #[test]
    fn groups_from_files() {
        let data_dict = data_dict();

        let mut inactive = NamedTempFile::new().unwrap();
        write!(inactive, "u0\nu1\nu42\n").unwrap();
        let mut active = NamedTempFile::new().unwrap();
        write!(active, "u2\n").unwrap();

        let files = [inactive.path().to_str().unwrap(), active.path().to_str().unwrap()];
        let user_groups = UserGroups::from_files(&files, &data_dict).unwrap();

        assert_eq!(user_groups.0.num_groups(), 2);
        assert_eq!(user_groups.0.members(0), vec![0, 1]);
        assert_eq!(user_groups.0.members(1), vec![2]);
    }
}
