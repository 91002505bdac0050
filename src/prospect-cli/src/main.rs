// Copyright 2025 The Prospect Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fs;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use sha2::{Digest, Sha256};

use prospect_compat::config::{ScenarioConfig, open_config};
use prospect_compat::engine::{Project, ScenarioResult, canonicalize};
use prospect_compat::{load_scenario_csv, open_database, open_losses, open_topologies, to_json};

const EXIT_FAILURE: i32 = 1;

#[macro_export]
macro_rules! die(
    ($($arg:tt)*) => { {
        eprintln!($($arg)*);
        std::process::exit(EXIT_FAILURE)
    } }
);

#[derive(Parser)]
#[command(name = "prospect", version, about = "Rewrite LCI databases to match IAM scenarios")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Transform a database once per scenario point and write the results
    Transform {
        /// Background LCI database, JSON
        #[arg(long)]
        database: PathBuf,
        /// Model region tables, JSON
        #[arg(long)]
        topology: PathBuf,
        /// Per-location loss factors, JSON
        #[arg(long)]
        losses: PathBuf,
        /// IAM scenario table, CSV
        #[arg(long)]
        scenarios: PathBuf,
        /// Scenario configuration, JSON
        #[arg(long)]
        config: PathBuf,
        /// Directory the transformed databases are written into
        #[arg(long)]
        out: PathBuf,
        /// Transform only the first N configured years
        #[arg(long)]
        points: Option<usize>,
        /// Print the sha256 of every output file
        #[arg(long)]
        checksum: bool,
    },
    /// Check a scenario configuration without touching a database
    Validate {
        #[arg(long)]
        config: PathBuf,
        /// Also check the configuration against a scenario table
        #[arg(long)]
        scenarios: Option<PathBuf>,
    },
    /// Print the region tables a topology file defines
    Regions {
        #[arg(long)]
        topology: PathBuf,
        /// Limit output to one model
        #[arg(long)]
        model: Option<String>,
    },
}

fn open_reader(path: &Path) -> BufReader<File> {
    match File::open(path) {
        Ok(file) => BufReader::new(file),
        Err(err) => die!("error: open '{}': {}", path.display(), err),
    }
}

fn load_config(path: &Path) -> ScenarioConfig {
    match open_config(&mut open_reader(path)) {
        Ok(config) => config,
        Err(err) => die!("error: config '{}': {}", path.display(), err),
    }
}

fn write_result(out: &Path, result: &ScenarioResult, checksum: bool) {
    eprintln!(
        "{}: {} markets built, {} old markets emptied, {} processes scaled, {} exchanges relinked, {} emissions split",
        result.point,
        result.summary.markets_built,
        result.summary.markets_emptied,
        result.summary.processes_scaled,
        result.summary.exchanges_relinked,
        result.summary.emission_splits,
    );
    for warning in result.warnings.iter() {
        eprintln!("warning: {}: {}", result.point, warning);
    }
    for finding in result.validation.iter() {
        eprintln!("dangling: {}: {}", result.point, finding);
    }

    let mut json = match to_json(&result.database) {
        Ok(json) => json,
        Err(err) => die!("error: serialize {}: {}", result.point, err),
    };
    json.push('\n');

    let file_name = format!("{}.json", result.point).replace(['/', ' '], "_");
    let path = out.join(&file_name);
    if let Err(err) = fs::write(&path, json.as_bytes()) {
        die!("error: write '{}': {}", path.display(), err);
    }

    if checksum {
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        println!("{:x}  {}", hasher.finalize(), file_name);
    }
}

#[allow(clippy::too_many_arguments)]
fn run_transform(
    database: &Path,
    topology: &Path,
    losses: &Path,
    scenarios: &Path,
    config: &Path,
    out: &Path,
    points: Option<usize>,
    checksum: bool,
) {
    let config = load_config(config);
    let db = match open_database(&mut open_reader(database)) {
        Ok(db) => db,
        Err(err) => die!("error: database '{}': {}", database.display(), err),
    };
    let topologies = match open_topologies(&mut open_reader(topology)) {
        Ok(topologies) => topologies,
        Err(err) => die!("error: topology '{}': {}", topology.display(), err),
    };
    let loss_table = match open_losses(&mut open_reader(losses)) {
        Ok(table) => table,
        Err(err) => die!("error: losses '{}': {}", losses.display(), err),
    };
    let scenarios = match scenarios.to_str() {
        Some(path) => path,
        None => die!("error: scenario path is not valid UTF-8"),
    };
    let table = match load_scenario_csv(scenarios, b',') {
        Ok(table) => table,
        Err(err) => die!("error: scenarios '{}': {}", scenarios, err),
    };

    let plan = match config.to_plan() {
        Ok(plan) => plan,
        Err(err) => die!("error: {}", err),
    };
    let mut inputs = match config.scenario_inputs(&table, &topologies) {
        Ok(inputs) => inputs,
        Err(err) => die!("error: {}", err),
    };
    if let Some(n) = points {
        inputs.truncate(n);
    }

    let project = match Project::new(db, &topologies, loss_table, plan, inputs) {
        Ok(project) => project,
        Err(err) => die!("error: {}", err),
    };
    for warning in project.errors.iter() {
        eprintln!("warning: {}", warning);
    }

    if let Err(err) = fs::create_dir_all(out) {
        die!("error: create '{}': {}", out.display(), err);
    }

    let mut failed = false;
    for result in project.transform_all() {
        match result {
            Ok(result) => write_result(out, &result, checksum),
            Err(err) => {
                eprintln!("error: {}", err);
                failed = true;
            }
        }
    }
    if failed {
        std::process::exit(EXIT_FAILURE);
    }
}

fn run_validate(config_path: &Path, scenarios: Option<&Path>) {
    let config = load_config(config_path);
    if let Some(path) = scenarios {
        let path = match path.to_str() {
            Some(path) => path,
            None => die!("error: scenario path is not valid UTF-8"),
        };
        let table = match load_scenario_csv(path, b',') {
            Ok(table) => table,
            Err(err) => die!("error: scenarios '{}': {}", path, err),
        };
        let model = canonicalize(&config.model);
        let pathway = canonicalize(&config.pathway);
        if table.model() != &model || table.pathway() != &pathway {
            die!(
                "error: scenario table holds {} {}, configuration wants {} {}",
                table.model(),
                table.pathway(),
                model,
                pathway
            );
        }
    }
    println!(
        "{}: ok ({} technologies, {} markets, {} years)",
        config_path.display(),
        config.technologies.len(),
        config.markets.len(),
        config.years.len()
    );
}

fn run_regions(topology: &Path, model: Option<&str>) {
    let topologies = match open_topologies(&mut open_reader(topology)) {
        Ok(topologies) => topologies,
        Err(err) => die!("error: topology '{}': {}", topology.display(), err),
    };
    let wanted = model.map(canonicalize);
    let mut shown = 0;
    for topology in topologies.iter() {
        if let Some(wanted) = &wanted {
            if &topology.model != wanted {
                continue;
            }
        }
        shown += 1;
        println!("{}:", topology.model);
        for (region, locations) in topology.regions.iter() {
            let codes: Vec<&str> = locations.iter().map(|l| l.as_str()).collect();
            println!("  {}: {}", region, codes.join(", "));
        }
        for (aggregate, members) in topology.aggregates.iter() {
            let codes: Vec<&str> = members.iter().map(|l| l.as_str()).collect();
            println!("  {} (aggregate): {}", aggregate, codes.join(", "));
        }
    }
    if shown == 0 {
        if let Some(model) = model {
            die!("error: no topology for model '{}'", model);
        }
    }
}

fn main() {
    let cli = Cli::parse();
    match cli.command {
        Command::Transform {
            database,
            topology,
            losses,
            scenarios,
            config,
            out,
            points,
            checksum,
        } => run_transform(
            &database, &topology, &losses, &scenarios, &config, &out, points, checksum,
        ),
        Command::Validate { config, scenarios } => run_validate(&config, scenarios.as_deref()),
        Command::Regions { topology, model } => run_regions(&topology, model.as_deref()),
    }
}
