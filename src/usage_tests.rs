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

#[cfg(test)]
mod tests {

    use std::io::Write;

    use tempfile::NamedTempFile;

    use crate::oracle::{PopularityOracle, ScoreFileOracle};
    use crate::{run_all, Dataset, ModelRun, OptimizationFailure, Partitions, RerankConfig,
        RerankError, ResultWriter, RunLabels};

    const USERS: [&str; 6] = ["alice", "bob", "charles", "dora", "emil", "frida"];
    const ITEMS: [&str; 8] = ["apple", "bike", "car", "dog", "egg", "fig", "guitar", "hat"];

    fn file_with(lines: &[String]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    fn path(file: &NamedTempFile) -> &str {
        file.path().to_str().unwrap()
    }

    fn config() -> RerankConfig {
        RerankConfig {
            top_n: 5,
            k: 2,
            user_epsilons: vec![0.5],
            item_epsilons: vec![0.25],
            num_threads: Some(2),
            ..RerankConfig::default()
        }
    }

    #[test]
    fn programmatic_usage() {

        /* Our input data comprises of observed interactions between users and items, as
           tab-separated triples of user, item and rating. Every item occurs in the training
           data, so that all of them get an index. */
        let mut train = Vec::new();
        for (user_index, user) in USERS.iter().enumerate() {
            for (item_index, item) in ITEMS.iter().enumerate() {
                if (user_index + item_index) % 3 == 0 {
                    train.push(format!("{}\t{}\t5", user, item));
                }
            }
        }

        /* The held-out interactions serve as ground truth, unknown entities are skipped. */
        let test = vec![
            String::from("alice\tbike\t4"),
            String::from("bob\tapple\t3"),
            String::from("charles\tegg\t5"),
            String::from("dora\tfig\t1"),
            String::from("emil\that\t2"),
            String::from("frida\tcar\t5"),
            String::from("frida\tunicorn\t5"),
            String::from("zoe\tapple\t5"),
        ];

        /* Scores of some external recommender for every user-item pair. */
        let mut scores = Vec::new();
        for (user_index, user) in USERS.iter().enumerate() {
            for (item_index, item) in ITEMS.iter().enumerate() {
                let score = ((user_index * 7 + item_index * 3) % 11) as f64 / 10.0
                    + item_index as f64 * 0.001;
                scores.push(format!("{}\t{}\t{}", user, item, score));
            }
        }

        let train_file = file_with(&train);
        let test_file = file_with(&test);
        let scores_file = file_with(&scores);

        /* Group memberships, one identifier per line. */
        let inactive_file = file_with(&[String::from("alice"), String::from("bob"),
            String::from("charles"), String::from("stranger")]);
        let active_file = file_with(&[String::from("dora"), String::from("emil"),
            String::from("frida")]);
        let short_head_file = file_with(&ITEMS[..3].iter().map(|item| item.to_string()).collect::<Vec<_>>());
        let long_tail_file = file_with(&ITEMS[3..].iter().map(|item| item.to_string()).collect::<Vec<_>>());

        let dataset = Dataset::from_files(path(&train_file), path(&test_file)).unwrap();

        assert_eq!(dataset.num_users(), 6);
        assert_eq!(dataset.num_items(), 8);

        let partitions = Partitions::from_files(
            path(&inactive_file),
            path(&active_file),
            path(&short_head_file),
            path(&long_tail_file),
            &dataset,
        ).unwrap();

        let oracle = ScoreFileOracle::from_file(path(&scores_file), &dataset.data_dict).unwrap();

        let labels = RunLabels {
            dataset: String::from("toy"),
            model: String::from("external"),
            user_groups: String::from("activity"),
            item_groups: String::from("popularity"),
        };

        let config = config();

        /* Scoring, candidate selection and the relevance and group indicators are computed
           once per model, every fairness mode reuses them. */
        let model_run = ModelRun::prepare(labels, &oracle, &dataset, &partitions, &config).unwrap();

        assert_eq!(model_run.problem().users.len(), 6);

        let mut csv_output: Vec<u8> = Vec::new();
        let mut json_output: Vec<u8> = Vec::new();

        let rows = {
            let mut results = ResultWriter::from_writer(&mut csv_output);
            run_all(&model_run, &config, &mut results, Some(&mut json_output)).unwrap()
        };

        let modes: Vec<&str> = rows.iter().map(|row| row.mode.as_str()).collect();
        assert_eq!(modes, vec!["N", "C", "P", "CP"]);

        for row in rows.iter() {
            assert_eq!(row.short_head_items + row.long_tail_items, 6 * 2);
            assert_eq!(row.all_items, "12==12");
            assert!(row.coverage_all >= 0.0 && row.coverage_all <= 100.0);
            assert!(row.precision_all >= 0.0 && row.precision_all <= 1.0);
        }

        assert_eq!(rows[0].user_epsilon, "-");
        assert_eq!(rows[3].user_epsilon, "0.5");
        assert_eq!(rows[3].item_epsilon, "0.25");

        let csv_text = String::from_utf8(csv_output).unwrap();
        assert_eq!(csv_text.lines().count(), 1 + 4);
        assert!(csv_text.starts_with("Dataset,Model,GUser,GItem,Type,User_EPS,Item_EPS,ndcg_ALL"));

        /* Every run writes one JSON line per user with the original identifiers. */
        let json_text = String::from_utf8(json_output).unwrap();
        assert_eq!(json_text.lines().count(), 4 * 6);

        for line in json_text.lines() {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            let items = parsed["recommended_items"].as_array().unwrap();

            assert_eq!(items.len(), 2);
            assert!(USERS.contains(&parsed["for_user"].as_str().unwrap()));
            for item in items {
                assert!(ITEMS.contains(&item.as_str().unwrap()));
            }
        }
    }

    fn pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter()
            .map(|(user, item)| (user.to_string(), item.to_string()))
            .collect()
    }

    fn tiny_dataset() -> Dataset {
        let train = pairs(&[("u1", "a"), ("u1", "b"), ("u2", "a"), ("u2", "c"), ("u3", "a"),
            ("u3", "d"), ("u3", "e")]);
        let test = pairs(&[("u1", "c"), ("u2", "b"), ("u3", "b")]);

        Dataset::from_interactions(&train, &test)
    }

    fn tiny_partitions(dataset: &Dataset, num_user_groups: usize) -> Partitions {
        let mut partitions = Partitions {
            user_groups: crate::groups::UserGroups::new(dataset.num_users(), num_user_groups),
            item_groups: crate::groups::ItemGroups::new(dataset.num_items(), 2),
        };

        if num_user_groups == 1 {
            partitions.user_groups.assign(0, vec!["u1", "u2", "u3"], &dataset.data_dict);
        } else {
            partitions.user_groups.assign(0, vec!["u1", "u2"], &dataset.data_dict);
            partitions.user_groups.assign(1, vec!["u3"], &dataset.data_dict);
        }
        partitions.item_groups.assign(0, vec!["a", "b"], &dataset.data_dict);
        partitions.item_groups.assign(1, vec!["c", "d", "e"], &dataset.data_dict);

        partitions
    }

    fn tiny_labels() -> RunLabels {
        RunLabels {
            dataset: String::from("tiny"),
            model: String::from("MostPop"),
            user_groups: String::from("activity"),
            item_groups: String::from("popularity"),
        }
    }

    #[test]
    fn popularity_baseline() {

        let dataset = tiny_dataset();
        let partitions = tiny_partitions(&dataset, 2);

        let oracle = PopularityOracle::new(&dataset.popularity, &dataset.train, dataset.num_items());

        let labels = tiny_labels();

        let config = RerankConfig {
            top_n: 3,
            k: 1,
            modes: vec![crate::ModeKind::NoFairness],
            num_threads: Some(1),
            ..RerankConfig::default()
        };

        let model_run = ModelRun::prepare(labels, &oracle, &dataset, &partitions, &config).unwrap();
        let outcome = model_run.run(crate::FairnessMode::NoFairness, &config).unwrap();

        let renaming = dataset.renaming();
        let u1 = dataset.data_dict.user_index("u1").unwrap() as usize;

        /* "a" is already known to every user, so u1 gets one of the unseen items. */
        assert_eq!(outcome.recommendations[u1].len(), 1);
        assert_ne!(renaming.item_name(outcome.recommendations[u1][0]), "a");
        assert_ne!(renaming.item_name(outcome.recommendations[u1][0]), "b");

        assert_eq!(outcome.row.all_items, "3==3");
        assert!(outcome.row.ndcg_all >= 0.0 && outcome.row.ndcg_all <= 1.0);
    }

    #[test]
    fn failed_mode_writes_no_row() {

        /* A single declared user group leaves nothing to balance for consumer fairness. The
           unconstrained run before it is written, the failing one is not. */
        let dataset = tiny_dataset();
        let partitions = tiny_partitions(&dataset, 1);
        let oracle = PopularityOracle::new(&dataset.popularity, &dataset.train, dataset.num_items());

        let config = RerankConfig {
            top_n: 3,
            k: 1,
            modes: vec![crate::ModeKind::NoFairness, crate::ModeKind::ConsumerFairness],
            num_threads: Some(1),
            ..RerankConfig::default()
        };

        let model_run = ModelRun::prepare(tiny_labels(), &oracle, &dataset, &partitions, &config)
            .unwrap();

        let mut csv_output: Vec<u8> = Vec::new();

        let (result, num_rows) = {
            let mut results = ResultWriter::from_writer(&mut csv_output);
            let result = run_all(&model_run, &config, &mut results, None);
            (result, results.num_rows())
        };

        match result {
            Err(RerankError::InvalidConfiguration(_)) => {},
            other => panic!("expected invalid configuration, got {:?}", other.map(|rows| rows.len())),
        }
        assert_eq!(num_rows, 1);

        let csv_text = String::from_utf8(csv_output).unwrap();
        let lines: Vec<&str> = csv_text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains(",N,"));
    }

    #[test]
    fn timed_out_solve_writes_no_row() {

        let dataset = tiny_dataset();
        let partitions = tiny_partitions(&dataset, 2);
        let oracle = PopularityOracle::new(&dataset.popularity, &dataset.train, dataset.num_items());

        let config = RerankConfig {
            top_n: 3,
            k: 1,
            modes: vec![crate::ModeKind::CombinedFairness],
            time_limit_secs: Some(1e-9),
            num_threads: Some(1),
            ..RerankConfig::default()
        };

        let model_run = ModelRun::prepare(tiny_labels(), &oracle, &dataset, &partitions, &config)
            .unwrap();

        let mut csv_output: Vec<u8> = Vec::new();

        let (result, num_rows) = {
            let mut results = ResultWriter::from_writer(&mut csv_output);
            let result = run_all(&model_run, &config, &mut results, None);
            (result, results.num_rows())
        };

        match result {
            Err(RerankError::OptimizationFailed { model, reason, .. }) => {
                assert_eq!(model, "MostPop");
                assert_eq!(Some(reason), config.time_limit().map(OptimizationFailure::TimedOut));
            },
            other => panic!("expected a timeout, got {:?}", other.map(|rows| rows.len())),
        }

        assert_eq!(num_rows, 0);
        assert!(csv_output.is_empty());
    }
}
