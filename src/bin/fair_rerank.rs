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
use std::io::Write;
use std::process;
use std::str::FromStr;

use getopts::{Matches, Options};

use fairreco::io;
use fairreco::oracle::{PopularityOracle, ScoreFileOracle};
use fairreco::{run_all, Dataset, ModelRun, Partitions, RerankConfig, ResultWriter, RunLabels};

/// Input files and labels of a single invocation.
struct Arguments {
    dataset: String,
    model: String,
    train: String,
    test: String,
    scores: Option<String>,
    inactive_users: String,
    active_users: String,
    short_head: String,
    long_tail: String,
    user_groups_label: String,
    item_groups_label: String,
    output: String,
    recommendations: Option<String>,
}

fn main() {

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("d", "dataset", "Name of the dataset (required), used in the result rows and \
        the default output file name.", "NAME");
    opts.optopt("m", "model", "Name of the scoring model (required).", "NAME");
    opts.optopt("", "train", "Training interactions (required). Tab-separated user, item and \
        optional rating per line. The user and item identifiers are taken from this file.", "PATH");
    opts.optopt("", "test", "Held-out interactions used as ground truth (required), same \
        format as the training file.", "PATH");
    opts.optopt("s", "scores", "Precomputed user-item scores of the model (optional). \
        Tab-separated user, item and score per line. Without scores, items are ranked by \
        popularity.", "PATH");
    opts.optopt("", "inactive-users", "Users of the disadvantaged group, one per line \
        (required).", "PATH");
    opts.optopt("", "active-users", "Users of the advantaged group, one per line \
        (required).", "PATH");
    opts.optopt("", "short-head", "Popular items, one per line (required).", "PATH");
    opts.optopt("", "long-tail", "Unpopular items, one per line (required).", "PATH");
    opts.optopt("", "user-groups-label", "Name of the user partition in the result rows \
        (optional, defaults to 'activity').", "NAME");
    opts.optopt("", "item-groups-label", "Name of the item partition in the result rows \
        (optional, defaults to 'popularity').", "NAME");
    opts.optopt("c", "config", "JSON file with the run configuration (optional).", "PATH");
    opts.optopt("k", "", "Length of the re-ranked lists (optional, overrides the \
        configuration, defaults to 10).", "NUMBER");
    opts.optopt("n", "top-n", "Number of candidates per user (optional, overrides the \
        configuration, defaults to 50).", "NUMBER");
    opts.optopt("o", "output", "Result file (optional, defaults to <dataset>_<model>.csv).",
        "PATH");
    opts.optopt("r", "recommendations", "Write the re-ranked lists of every run as JSON lines \
        to this file (optional, '-' for stdout).", "PATH");
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

    let level = if matches.opt_present("v") { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let required = ["dataset", "model", "train", "test", "inactive-users", "active-users",
        "short-head", "long-tail"];

    for option in required.iter() {
        if !matches.opt_present(option) {
            let hint = format!("Please specify --{}.", option);
            return print_usage_and_exit(&program, &opts, Some(&hint));
        }
    }

    let mut config = match matches.opt_str("c") {
        Some(path) => match RerankConfig::from_json_file(&path) {
            Ok(config) => config,
            Err(failure) => {
                let hint = format!("Problem with option 'config': {}", failure);
                return print_usage_and_exit(&program, &opts, Some(&hint));
            },
        },
        None => RerankConfig::default(),
    };

    match numeric_override(&matches, "k") {
        Ok(Some(k)) => config.k = k,
        Ok(None) => {},
        Err(hint) => return print_usage_and_exit(&program, &opts, Some(&hint)),
    }

    match numeric_override(&matches, "n") {
        Ok(Some(top_n)) => config.top_n = top_n,
        Ok(None) => {},
        Err(hint) => return print_usage_and_exit(&program, &opts, Some(&hint)),
    }

    let arguments = arguments(&matches);

    if let Err(failure) = rerank(&arguments, &config) {
        tracing::error!(%failure, "Re-ranking failed");
        process::exit(1);
    }
}

fn arguments(matches: &Matches) -> Arguments {
    let required = |name: &str| matches.opt_str(name).unwrap_or_default();

    let dataset = required("dataset");
    let model = required("model");
    let output = matches.opt_str("output")
        .unwrap_or_else(|| format!("{}_{}.csv", dataset, model));

    Arguments {
        train: required("train"),
        test: required("test"),
        scores: matches.opt_str("scores"),
        inactive_users: required("inactive-users"),
        active_users: required("active-users"),
        short_head: required("short-head"),
        long_tail: required("long-tail"),
        user_groups_label: matches.opt_str("user-groups-label")
            .unwrap_or_else(|| String::from("activity")),
        item_groups_label: matches.opt_str("item-groups-label")
            .unwrap_or_else(|| String::from("popularity")),
        recommendations: matches.opt_str("recommendations"),
        dataset,
        model,
        output,
    }
}

fn numeric_override<T: FromStr>(matches: &Matches, name: &str) -> Result<Option<T>, String>
    where T::Err: ToString {

    matches.opt_get::<T>(name)
        .map_err(|failure| format!("Problem with option '{}': {}", name, failure.to_string()))
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

fn rerank(arguments: &Arguments, config: &RerankConfig) -> Result<(), Box<dyn Error>> {

    let dataset = Dataset::from_files(&arguments.train, &arguments.test)?;

    let partitions = Partitions::from_files(
        &arguments.inactive_users,
        &arguments.active_users,
        &arguments.short_head,
        &arguments.long_tail,
        &dataset,
    )?;

    let labels = RunLabels {
        dataset: arguments.dataset.clone(),
        model: arguments.model.clone(),
        user_groups: arguments.user_groups_label.clone(),
        item_groups: arguments.item_groups_label.clone(),
    };

    tracing::info!(output = arguments.output.as_str(), "Writing results");
    let mut results = ResultWriter::create(&arguments.output)?;

    let recommendations_path = match arguments.recommendations.as_ref() {
        Some(path) if path == "-" => None,
        Some(path) => Some(path.as_str()),
        None => None,
    };

    let mut recommendations_out = match arguments.recommendations {
        Some(_) => Some(io::open_output(recommendations_path)?),
        None => None,
    };

    let out = recommendations_out.as_mut().map(|out| out.as_mut() as &mut dyn Write);

    match arguments.scores.as_ref() {
        Some(scores) => {
            tracing::info!(scores = scores.as_str(), "Reading precomputed scores");
            let oracle = ScoreFileOracle::from_file(scores, &dataset.data_dict)?;
            let model_run = ModelRun::prepare(labels, &oracle, &dataset, &partitions, config)?;
            run_all(&model_run, config, &mut results, out)?;
        },
        None => {
            tracing::info!("No scores given, ranking by popularity");
            let oracle = PopularityOracle::new(&dataset.popularity, &dataset.train, dataset.num_items());
            let model_run = ModelRun::prepare(labels, &oracle, &dataset, &partitions, config)?;
            run_all(&model_run, config, &mut results, out)?;
        },
    }

    if let Some(out) = recommendations_out.as_mut() {
        out.flush()?;
    }

    Ok(())
}
