// Copyright 2025 The Prospect Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::{BTreeSet, HashMap};

use crate::common::{Error, ErrorCode, ErrorKind, Ident, Result};
use crate::datamodel::{Location, Process, ProcessClass, ProcessKey};
use crate::db_err;

/// The in-memory background database: an owned list of processes plus the
/// indexes the resolver and relinker need.  Identity (the [`ProcessKey`])
/// is immutable once a process is in the database; exchanges and volumes
/// are not.
///
/// One `Database` is cloned per Scenario Point, so everything here is plain
/// owned data.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Database {
    processes: Vec<Process>,
    index: HashMap<ProcessKey, usize>,
    // (name, product) -> indices of all processes sharing that identity
    // prefix, i.e. the raw candidate pool before any location matching
    by_identity: HashMap<(Ident, Ident), Vec<usize>>,
}

/// Output of the whole-database validation pass.  `structural` violations
/// (non-finite or negative amounts, missing reference outputs) abort a
/// Scenario Point; `dangling` references are flagged per exchange and left
/// to the output validation surface.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IntegrityReport {
    pub structural: Vec<Error>,
    pub dangling: Vec<Error>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.structural.is_empty() && self.dangling.is_empty()
    }
}

impl Database {
    pub fn new(processes: Vec<Process>) -> Result<Database> {
        let mut db = Database {
            processes: Vec::with_capacity(processes.len()),
            index: HashMap::with_capacity(processes.len()),
            by_identity: HashMap::new(),
        };
        for process in processes {
            db.insert(process)?;
        }
        Ok(db)
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn contains(&self, key: &ProcessKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn index_of(&self, key: &ProcessKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn get(&self, key: &ProcessKey) -> Option<&Process> {
        self.index_of(key).map(|i| &self.processes[i])
    }

    pub fn get_mut(&mut self, key: &ProcessKey) -> Option<&mut Process> {
        let i = self.index_of(key)?;
        Some(&mut self.processes[i])
    }

    pub fn process_at(&self, i: usize) -> &Process {
        &self.processes[i]
    }

    pub fn process_at_mut(&mut self, i: usize) -> &mut Process {
        &mut self.processes[i]
    }

    pub fn processes(&self) -> impl Iterator<Item = &Process> {
        self.processes.iter()
    }

    pub fn processes_mut(&mut self) -> impl Iterator<Item = &mut Process> {
        self.processes.iter_mut()
    }

    pub fn insert(&mut self, process: Process) -> Result<usize> {
        if self.index.contains_key(&process.key) {
            return db_err!(DuplicateProcess, format!("{}", process.key));
        }
        let i = self.processes.len();
        self.index.insert(process.key.clone(), i);
        self.by_identity
            .entry((process.key.name.clone(), process.key.product.clone()))
            .or_default()
            .push(i);
        self.processes.push(process);
        Ok(i)
    }

    /// All processes sharing a (name, product) identity prefix, across
    /// every location.  The resolver's tier 2-5 matching starts from this
    /// pool.
    pub fn candidates(&self, name: &Ident, product: &Ident) -> &[usize] {
        self.by_identity
            .get(&(name.clone(), product.clone()))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Markets supplying `product`, in database order.  Used by the
    /// relinker to find the processes a new regional market supersedes.
    pub fn markets_for(&self, product: &Ident) -> Vec<usize> {
        self.processes
            .iter()
            .enumerate()
            .filter(|(_, p)| p.class == ProcessClass::Market && &p.key.product == product)
            .map(|(i, _)| i)
            .collect()
    }

    /// The set of location codes appearing on processes.  The Geography
    /// Index is cross-checked against this universe at project build.
    pub fn locations(&self) -> BTreeSet<Location> {
        self.processes.iter().map(|p| p.key.location.clone()).collect()
    }

    pub fn check_integrity(&self) -> IntegrityReport {
        let mut report = IntegrityReport::default();

        for process in self.processes.iter() {
            report.structural.extend(process.check_integrity());

            for exchange in process.exchanges.iter() {
                if let Some(target) = exchange.technosphere_key() {
                    if target != &process.key && !self.index.contains_key(target) {
                        report.dangling.push(Error::new(
                            ErrorKind::Validation,
                            ErrorCode::DanglingReference,
                            Some(format!("{} -> {}", process.key, target)),
                        ));
                    }
                }
            }
        }

        report
    }
}
