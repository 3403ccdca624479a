use crate::types::{BinaryMatrix, CandidateMatrix, SparseBinaryMatrix};

/// Marks every candidate slot whose item is in the user's held-out ground truth. Users
/// without candidates get an empty row.
pub fn build_relevance_matrix(
    candidates: &CandidateMatrix,
    ground_truth: &SparseBinaryMatrix,
) -> BinaryMatrix {

    candidates.iter()
        .enumerate()
        .map(|(user, user_candidates)| {
            match ground_truth.get(user) {
                Some(relevant_items) => user_candidates.iter()
                    .map(|item| relevant_items.contains(item))
                    .collect(),
                None => vec![false; user_candidates.len()],
            }
        })
        .collect()
}

/// Number of relevant candidates per user.
pub fn hits_per_user(relevance: &BinaryMatrix) -> Vec<usize> {
    relevance.iter()
        .map(|row| row.iter().filter(|is_relevant| **is_relevant).count())
        .collect()
}

#[cfg(test)]
mod tests {

    use fnv::FnvHashSet;

    use crate::relevance;

    #[test]
    fn relevant_slots() {
        let candidates = vec![vec![7, 3, 9], vec![1, 2, 3], vec![]];

        let ground_truth: Vec<FnvHashSet<u32>> = vec![
            [3].iter().cloned().collect(),
            [4, 1, 3].iter().cloned().collect(),
            [5].iter().cloned().collect(),
        ];

        let relevance = relevance::build_relevance_matrix(&candidates, &ground_truth);

        assert_eq!(relevance[0], vec![false, true, false]);
        assert_eq!(relevance[1], vec![true, false, true]);
        assert!(relevance[2].is_empty());

        assert_eq!(relevance::hits_per_user(&relevance), vec![1, 2, 0]);
    }

    #[test]
    fn users_beyond_ground_truth_have_no_hits() {
        let candidates = vec![vec![0, 1]];
        let relevance = relevance::build_relevance_matrix(&candidates, &Vec::new());

        assert_eq!(relevance[0], vec![false, false]);
    }
}
