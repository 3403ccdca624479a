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

use std::env;
use std::error::Error;
use std::io::stdout;
use std::process;

use fnv::FnvHashSet;
use getopts::Options;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use fairreco::error::ScoringError;
use fairreco::groups::{ItemGroups, UserGroups, ACTIVE_USERS, INACTIVE_USERS, LONG_TAIL_ITEMS,
    SHORT_HEAD_ITEMS};
use fairreco::types::DenseMatrix;
use fairreco::{run_all, Dataset, ModelRun, Partitions, RerankConfig, ResultWriter, RunLabels};

/// Share of the users and items that form the active group and the short head.
const HEAD_FRACTION: f64 = 0.2;
const HELD_OUT_PER_USER: usize = 3;

fn main() {

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("u", "users", "Number of users to generate (optional, defaults to 60).", "NUMBER");
    opts.optopt("i", "items", "Number of items to generate (optional, defaults to 80).", "NUMBER");
    opts.optopt("", "seed", "Seed of the random generator (optional, defaults to 42).", "NUMBER");
    opts.optopt("k", "", "Length of the re-ranked lists (optional, defaults to 5).", "NUMBER");
    opts.optopt("n", "top-n", "Number of candidates per user (optional, defaults to 20).",
        "NUMBER");
    opts.optflag("v", "verbose", "Log per-solve details");
    opts.optflag("h", "help", "Print this help menu");

    let matches = match opts.parse(&args[1..]) {
        Ok(matches) => matches,
        Err(failure) => {
            let hint = failure.to_string();
            return print_usage_and_exit(&program, &opts, Some(&hint))
        },
    };

    if matches.opt_present("h") {
        return print_usage_and_exit(&program, &opts, None);
    }

    let parsed = matches.opt_get_default("u", 60_usize)
        .and_then(|num_users| matches.opt_get_default("i", 80_usize)
            .map(|num_items| (num_users, num_items)))
        .and_then(|(num_users, num_items)| matches.opt_get_default("seed", 42_u64)
            .map(|seed| (num_users, num_items, seed)));

    let (num_users, num_items, seed) = match parsed {
        Ok(values) => values,
        Err(failure) => {
            let hint = format!("Problem with a numeric option: {}", failure);
            return print_usage_and_exit(&program, &opts, Some(&hint));
        },
    };

    let list_lengths = matches.opt_get_default("k", 5_usize)
        .and_then(|k| matches.opt_get_default("n", 20_usize).map(|top_n| (k, top_n)));

    let (k, top_n) = match list_lengths {
        Ok(values) => values,
        Err(failure) => {
            let hint = format!("Problem with option 'k' or 'top-n': {}", failure);
            return print_usage_and_exit(&program, &opts, Some(&hint));
        },
    };

    let level = if matches.opt_present("v") { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = RerankConfig {
        k,
        top_n,
        user_epsilons: vec![0.0005, 0.05],
        item_epsilons: vec![0.0001, 0.01],
        ..RerankConfig::default()
    };

    if let Err(failure) = rerank_synthetic(num_users, num_items, seed, &config) {
        tracing::error!(%failure, "Re-ranking failed");
        process::exit(1);
    }
}

fn print_usage_and_exit(
    program: &str,
    opts: &Options,
    hint: Option<&str>
) {

    if let Some(hint) = hint {
        eprintln!("\n{}\n", hint);
    }

    let brief = format!("Usage: {} [options]", program);
    eprint!("{}", opts.usage(&brief));

    process::exit(if hint.is_some() { 1 } else { 0 });
}

/// Interactions with a skewed item popularity: low item indices are drawn far more often.
fn draw_item<R: Rng>(rng: &mut R, num_items: usize) -> usize {
    let draw: f64 = rng.gen();
    ((draw * draw * num_items as f64) as usize).min(num_items - 1)
}

fn rerank_synthetic(
    num_users: usize,
    num_items: usize,
    seed: u64,
    config: &RerankConfig,
) -> Result<(), Box<dyn Error>> {

    if num_users == 0 || num_items == 0 {
        return Err(From::from("need at least one user and one item"));
    }

    let mut rng = StdRng::seed_from_u64(seed);

    let mut train = Vec::new();
    let mut test = Vec::new();

    // every item occurs at least once, so that the catalog is known
    for item in 0..num_items {
        let user = rng.gen_range(0..num_users);
        train.push((format!("user{}", user), format!("item{}", item)));
    }

    for user in 0..num_users {
        let activity = rng.gen_range(2..(num_items / 4).max(3));
        let mut history = FnvHashSet::default();

        for _ in 0..activity {
            history.insert(draw_item(&mut rng, num_items));
        }
        for item in history.iter() {
            train.push((format!("user{}", user), format!("item{}", item)));
        }

        for _ in 0..HELD_OUT_PER_USER {
            let item = draw_item(&mut rng, num_items);
            if !history.contains(&item) {
                test.push((format!("user{}", user), format!("item{}", item)));
            }
        }
    }

    let dataset = Dataset::from_interactions(&train, &test);

    let partitions = synthetic_partitions(&dataset);

    // Noisy model that partially knows the held-out items.
    let mut scores: DenseMatrix = Vec::with_capacity(dataset.num_users());
    for user in 0..dataset.num_users() {
        let relevant = &dataset.ground_truth[user];
        let user_scores = (0..dataset.num_items() as u32)
            .map(|item| {
                let signal = if relevant.contains(&item) { 0.3 } else { 0.0 };
                signal + rng.gen_range(0.0..1.0)
            })
            .collect();
        scores.push(user_scores);
    }

    let oracle = |user: u32| scores.get(user as usize)
        .cloned()
        .ok_or(ScoringError::CannotScore(user));

    let labels = RunLabels {
        dataset: format!("synthetic-{}", seed),
        model: String::from("noisy-oracle"),
        user_groups: String::from("activity"),
        item_groups: String::from("popularity"),
    };

    let model_run = ModelRun::prepare(labels, &oracle, &dataset, &partitions, config)?;

    let mut results = ResultWriter::from_writer(stdout());
    run_all(&model_run, config, &mut results, None)?;

    Ok(())
}

/// The most active users and the most popular items form the advantaged groups.
fn synthetic_partitions(dataset: &Dataset) -> Partitions {

    let mut users_by_activity: Vec<u32> = (0..dataset.num_users() as u32).collect();
    users_by_activity.sort_by_key(|user| std::cmp::Reverse(dataset.train[*user as usize].len()));

    let mut items_by_popularity: Vec<u32> = (0..dataset.num_items() as u32).collect();
    items_by_popularity.sort_by_key(|item| {
        std::cmp::Reverse(dataset.popularity.get(item).cloned().unwrap_or(0))
    });

    let num_active = ((dataset.num_users() as f64 * HEAD_FRACTION).ceil() as usize).max(1);
    let num_short_head = ((dataset.num_items() as f64 * HEAD_FRACTION).ceil() as usize).max(1);

    let mut user_groups = UserGroups::new(dataset.num_users(), 2);
    user_groups.0.assign_indices(ACTIVE_USERS, &users_by_activity[..num_active]);
    user_groups.0.assign_indices(INACTIVE_USERS, &users_by_activity[num_active..]);

    let mut item_groups = ItemGroups::new(dataset.num_items(), 2);
    item_groups.0.assign_indices(SHORT_HEAD_ITEMS, &items_by_popularity[..num_short_head]);
    item_groups.0.assign_indices(LONG_TAIL_ITEMS, &items_by_popularity[num_short_head..]);

    Partitions { user_groups, item_groups }
}
