// Copyright 2025 The Prospect Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;

use crate::datamodel::{ProcessKey, SupplyShare};
use crate::volumes::VolumeIndex;

/// Turn a candidate set into normalized supply shares, proportional to
/// production volume.  A multiset of candidates always yields the same
/// shares, and the output is ordered largest supplier first (ties broken
/// by key) so rebuilt databases diff cleanly.
///
/// A single candidate gets share 1 regardless of volume; an all-zero set
/// falls back to equal shares rather than dividing by zero.  The empty
/// set allocates to nothing, which the caller has already warned about.
pub fn allocate<'a, I>(volumes: &VolumeIndex, candidates: I) -> Vec<SupplyShare>
where
    I: IntoIterator<Item = &'a ProcessKey>,
{
    let mut weighted: Vec<(ProcessKey, f64)> = candidates
        .into_iter()
        .map(|key| (key.clone(), volumes.volume_of(key)))
        .collect();
    weighted.sort_by(|a, b| {
        (Reverse(OrderedFloat(a.1)), &a.0).cmp(&(Reverse(OrderedFloat(b.1)), &b.0))
    });

    if weighted.is_empty() {
        return Vec::new();
    }
    if weighted.len() == 1 {
        let (key, _) = weighted.pop().unwrap();
        return vec![SupplyShare { key, share: 1.0 }];
    }

    let total: f64 = weighted.iter().map(|(_, v)| v).sum();
    if total == 0.0 {
        let share = 1.0 / weighted.len() as f64;
        return weighted
            .into_iter()
            .map(|(key, _)| SupplyShare { key, share })
            .collect();
    }

    weighted
        .into_iter()
        .map(|(key, volume)| SupplyShare {
            key,
            share: volume / total,
        })
        .collect()
}
