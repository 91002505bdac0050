// Copyright 2025 The Prospect Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use crate::common::{FilterSpec, Ident, Result};
use crate::database::Database;
use crate::datamodel::{Exchange, ExchangeTarget, FlowKind, Location, ProcessKey};
use crate::geography::GeographyIndex;
use crate::xform_err;

/// Which consumers a relink pass applies to: inside one IAM region (the
/// normal case for a freshly built regional market), optionally narrowed
/// further by a free-text predicate on the consumer's name or product.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    pub model: Ident,
    pub region: Option<Location>,
    pub filter: FilterSpec,
}

impl Scope {
    pub fn region(model: Ident, region: Location) -> Scope {
        Scope {
            model,
            region: Some(region),
            filter: FilterSpec::Any,
        }
    }

    pub fn everywhere() -> Scope {
        Scope::default()
    }

    pub fn with_filter(mut self, filter: FilterSpec) -> Scope {
        self.filter = filter;
        self
    }

    fn admits(&self, geo: &GeographyIndex, consumer_key: &ProcessKey) -> bool {
        if let Some(region) = &self.region {
            if !geo.in_region(&self.model, region, &consumer_key.location) {
                return false;
            }
        }
        self.filter.is_any()
            || self.filter.matches(consumer_key.name.as_str())
            || self.filter.matches(consumer_key.product.as_str())
    }
}

/// Repoint every in-scope technosphere exchange targeting `old` at `new`,
/// preserving amounts.  The processes at `old` and `new` themselves are
/// never rewritten: the superseded process is handled by
/// [`empty_to_passthrough`], and rewriting the replacement's own supplier
/// list would tie it into a loop.  Returns how many exchanges moved.
pub fn relink(
    db: &mut Database,
    geo: &GeographyIndex,
    old: &ProcessKey,
    new: &ProcessKey,
    scope: &Scope,
) -> usize {
    let mut rewritten = 0;
    for process in db.processes_mut() {
        if &process.key == old || &process.key == new {
            continue;
        }
        if !scope.admits(geo, &process.key) {
            continue;
        }
        for exchange in process.exchanges.iter_mut() {
            if exchange.kind == FlowKind::Output {
                continue;
            }
            if exchange.technosphere_key() == Some(old) {
                exchange.target = ExchangeTarget::Process(new.clone());
                rewritten += 1;
            }
        }
    }
    rewritten
}

/// Turn a superseded market into a pure pass-through: its exchange list
/// becomes one unit of reference output fed by one unit from `new`.
/// Consumers that were out of every relink scope keep resolving through
/// it and land on the replacement anyway.
pub fn empty_to_passthrough(db: &mut Database, old: &ProcessKey, new: &ProcessKey) -> Result<()> {
    if old == new {
        return xform_err!(
            DanglingReference,
            format!("{} cannot pass through to itself", old)
        );
    }
    if !db.contains(new) {
        return xform_err!(DoesNotExist, format!("{}", new));
    }
    let Some(process) = db.get_mut(old) else {
        return xform_err!(DoesNotExist, format!("{}", old));
    };

    let unit = process.unit.clone();
    process.exchanges.clear();
    process.exchanges.push(Exchange {
        target: ExchangeTarget::Process(old.clone()),
        kind: FlowKind::Output,
        amount: 1.0,
        unit: unit.clone(),
    });
    process.exchanges.push(Exchange {
        target: ExchangeTarget::Process(new.clone()),
        kind: FlowKind::Input,
        amount: 1.0,
        unit,
    });
    Ok(())
}
