// Copyright 2025 The Prospect Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use smallvec::SmallVec;

use crate::common::{ErrorCode, FilterSpec, Ident};
use crate::database::Database;
use crate::datamodel::{Location, LocationKind, ProcessKey};
use crate::geography::GeographyIndex;
use crate::transform::TransformContext;

/// How a candidate set was matched, in decreasing order of specificity.
/// Carried on the result so callers and tests can audit which branch of
/// the decision tree fired.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MatchKind {
    /// The identity exists at the target location itself.
    Exact,
    /// Members of the target IAM region.
    RegionMembers,
    /// The GLO / RoW stand-ins.
    WorldFallback,
    /// Geographic containment overlap with the target footprint.
    Overlap,
    Empty,
}

/// An ordered candidate set: indices into the database, in database order,
/// so repeated runs produce identical output.  Overlap matches carry an
/// implicit weight of 1 per candidate; finer weighting would need trade
/// data we do not have.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    pub matched: MatchKind,
    pub indices: SmallVec<[usize; 8]>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn keys<'a>(&'a self, db: &'a Database) -> impl Iterator<Item = &'a ProcessKey> + 'a {
        self.indices.iter().map(|&i| &db.process_at(i).key)
    }
}

/// Resolve the processes eligible to supply `(name, product)` at
/// `target`, trying in order: the exact location, the members of the
/// target region, the world stand-ins, and finally any candidate whose
/// geographic footprint overlaps the target's.  An empty result is a
/// warning on the context, never a failure; the caller decides whether to
/// skip or abort its own step.
///
/// Results are cached on the context under `(name, product, target)`.
/// The cache belongs to one Scenario Point and dies with it: earlier
/// steps of the same run add processes, so a cache shared across runs
/// would resolve against the wrong universe.  Filtered lookups bypass
/// the cache since the filter is not part of the key.
pub fn resolve(
    ctx: &mut TransformContext,
    db: &Database,
    geo: &GeographyIndex,
    name: &Ident,
    product: &Ident,
    target: &Location,
    filter: &FilterSpec,
) -> Resolution {
    if filter.is_any() {
        if let Some(cached) = ctx.cached(name, product, target) {
            return cached;
        }
    }

    let resolution = resolve_uncached(ctx.model(), db, geo, name, product, target, filter);

    if resolution.matched == MatchKind::Empty {
        ctx.warn(
            ErrorCode::EmptyCandidateSet,
            format!("{} | {} has no supplier for {}", name, product, target),
        );
    }
    if filter.is_any() {
        ctx.remember(name, product, target, resolution.clone());
    }
    resolution
}

fn resolve_uncached(
    model: &Ident,
    db: &Database,
    geo: &GeographyIndex,
    name: &Ident,
    product: &Ident,
    target: &Location,
    filter: &FilterSpec,
) -> Resolution {
    let pool: SmallVec<[usize; 8]> = db
        .candidates(name, product)
        .iter()
        .copied()
        .filter(|&i| {
            let p = db.process_at(i);
            filter.is_any()
                || filter.matches(p.key.name.as_str())
                || filter.matches(p.key.product.as_str())
        })
        .collect();

    // identity present at the target location itself
    let exact = ProcessKey::new(name.clone(), product.clone(), target.clone());
    if let Some(i) = db.index_of(&exact) {
        if pool.contains(&i) {
            return Resolution {
                matched: MatchKind::Exact,
                indices: SmallVec::from_slice(&[i]),
            };
        }
    }

    let kind = geo.kind_of(model, target);

    if kind == LocationKind::Region {
        let members: SmallVec<[usize; 8]> = pool
            .iter()
            .copied()
            .filter(|&i| geo.in_region(model, target, &db.process_at(i).key.location))
            .collect();
        if !members.is_empty() {
            return Resolution {
                matched: MatchKind::RegionMembers,
                indices: members,
            };
        }
    }

    let world: SmallVec<[usize; 8]> = pool
        .iter()
        .copied()
        .filter(|&i| {
            let loc = &db.process_at(i).key.location;
            loc.is_global() || loc.is_rest_of_world()
        })
        .collect();
    if !world.is_empty() {
        return Resolution {
            matched: MatchKind::WorldFallback,
            indices: world,
        };
    }

    let overlap: SmallVec<[usize; 8]> = pool
        .iter()
        .copied()
        .filter(|&i| geo.overlaps(model, &db.process_at(i).key.location, target))
        .collect();
    if !overlap.is_empty() {
        return Resolution {
            matched: MatchKind::Overlap,
            indices: overlap,
        };
    }

    Resolution {
        matched: MatchKind::Empty,
        indices: SmallVec::new(),
    }
}
