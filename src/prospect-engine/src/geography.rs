// Copyright 2025 The Prospect Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::common::{Error, ErrorCode, ErrorKind, Ident};
use crate::datamodel::{Location, LocationKind};

/// Static topology tables for one IAM model: the ordered region
/// definitions plus the aggregate containment lists shared by all models
/// (trade blocs like "RER" that background databases use as locations).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Topology {
    pub model: Ident,
    pub regions: Vec<(Location, Vec<Location>)>,
    pub aggregates: Vec<(Location, Vec<Location>)>,
}

#[derive(Clone, Debug, Default, PartialEq)]
struct ModelGeography {
    region_order: Vec<Location>,
    regions: BTreeMap<Location, BTreeSet<Location>>,
    location_to_region: HashMap<Location, Location>,
}

/// Bidirectional mapping between fine-grained location codes and IAM
/// region codes, built once per project and shared read-only by every
/// Scenario Point worker.
///
/// There is no computation here beyond set membership; all hierarchy comes
/// from the topology tables.  Unknown locations never fail: they are
/// simply absent from every region, and the project build records them as
/// warnings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeographyIndex {
    models: HashMap<Ident, ModelGeography>,
    aggregates: BTreeMap<Location, BTreeSet<Location>>,
    warnings: Vec<Error>,
}

impl GeographyIndex {
    pub fn new(topologies: &[Topology]) -> GeographyIndex {
        let mut index = GeographyIndex::default();

        for topology in topologies {
            let mut geo = ModelGeography::default();
            for (region, members) in topology.regions.iter() {
                geo.region_order.push(region.clone());
                let member_set: BTreeSet<Location> = members.iter().cloned().collect();
                for member in member_set.iter() {
                    if let Some(first) = geo.location_to_region.get(member) {
                        index.warnings.push(Error::new(
                            ErrorKind::Import,
                            ErrorCode::OverlappingRegions,
                            Some(format!(
                                "{}: {} claimed by both {} and {}",
                                topology.model, member, first, region
                            )),
                        ));
                    } else {
                        geo.location_to_region
                            .insert(member.clone(), region.clone());
                    }
                }
                geo.regions.insert(region.clone(), member_set);
            }
            index.models.insert(topology.model.clone(), geo);

            for (aggregate, contained) in topology.aggregates.iter() {
                index
                    .aggregates
                    .entry(aggregate.clone())
                    .or_default()
                    .extend(contained.iter().cloned());
            }
        }

        index
    }

    /// Warnings recorded while building (overlapping region claims).
    pub fn warnings(&self) -> &[Error] {
        &self.warnings
    }

    /// The model's regions in topology-file order.  This is the order
    /// markets are built in, so outputs are deterministic.
    pub fn regions(&self, model: &Ident) -> &[Location] {
        self.models
            .get(model)
            .map(|geo| geo.region_order.as_slice())
            .unwrap_or(&[])
    }

    pub fn locations_in(&self, model: &Ident, region: &Location) -> Option<&BTreeSet<Location>> {
        self.models.get(model)?.regions.get(region)
    }

    /// Which region of `model` claims `location`; `None` when no region
    /// does (the "excluded from region" case).  With overlapping claims
    /// the first region in topology order wins.
    pub fn region_containing(&self, model: &Ident, location: &Location) -> Option<&Location> {
        self.models.get(model)?.location_to_region.get(location)
    }

    /// Containment list of an aggregate location like "RER".
    pub fn contained(&self, aggregate: &Location) -> Option<&BTreeSet<Location>> {
        self.aggregates.get(aggregate)
    }

    pub fn kind_of(&self, model: &Ident, location: &Location) -> LocationKind {
        if location.is_global() {
            return LocationKind::Global;
        }
        if location.is_rest_of_world() {
            return LocationKind::RestOfWorld;
        }
        if let Some(geo) = self.models.get(model) {
            if geo.regions.contains_key(location) {
                return LocationKind::Region;
            }
        }
        if self.aggregates.contains_key(location) {
            return LocationKind::Aggregate;
        }
        LocationKind::Plain
    }

    /// True when `location` is inside `region`: a member location, or the
    /// region code itself (processes synthesized for the region live at
    /// the region code).
    pub fn in_region(&self, model: &Ident, region: &Location, location: &Location) -> bool {
        if region == location {
            return true;
        }
        self.locations_in(model, region)
            .map(|members| members.contains(location))
            .unwrap_or(false)
    }

    /// Fuzzy geographic overlap used by the resolver's last matching tier:
    /// do the footprints of `a` and `b` intersect per the containment
    /// data?  Footprints expand regions to their members and aggregates to
    /// their containment lists; plain codes are their own footprint.
    /// Global and RestOfWorld have no footprint here, they are handled a
    /// tier earlier.
    pub fn overlaps(&self, model: &Ident, a: &Location, b: &Location) -> bool {
        if a == b {
            return true;
        }
        let fa = self.footprint(model, a);
        let fb = self.footprint(model, b);
        if fa.contains(b) || fb.contains(a) {
            return true;
        }
        !fa.is_disjoint(&fb)
    }

    fn footprint(&self, model: &Ident, location: &Location) -> BTreeSet<Location> {
        match self.kind_of(model, location) {
            LocationKind::Region => self
                .locations_in(model, location)
                .cloned()
                .unwrap_or_default(),
            LocationKind::Aggregate => self.contained(location).cloned().unwrap_or_default(),
            LocationKind::Plain => [location.clone()].into_iter().collect(),
            LocationKind::Global | LocationKind::RestOfWorld => BTreeSet::new(),
        }
    }
}
