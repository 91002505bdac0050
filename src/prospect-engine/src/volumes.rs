// Copyright 2025 The Prospect Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;

use crate::common::{Error, ErrorCode, ErrorKind, Ident};
use crate::database::Database;
use crate::datamodel::{Location, ProcessKey};

/// Read-only snapshot of the production volumes found in a database,
/// taken before any transform mutates it.  Allocation always divides by
/// the volumes the supplier mix had on import, not whatever a previous
/// pass rewrote.
///
/// Negative or non-finite volumes are clamped to zero with a warning, so a
/// share can never come out negative.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VolumeIndex {
    volumes: HashMap<ProcessKey, f64>,
    by_product: HashMap<(Ident, Location), f64>,
    warnings: Vec<Error>,
}

impl VolumeIndex {
    pub fn new(db: &Database) -> VolumeIndex {
        let mut index = VolumeIndex::default();
        for process in db.processes() {
            let volume = process.volume;
            if !volume.is_finite() || volume < 0.0 {
                index.warnings.push(Error::new(
                    ErrorKind::Import,
                    ErrorCode::NegativeAmount,
                    Some(format!(
                        "production volume {} for {} treated as 0",
                        volume, process.key
                    )),
                ));
            } else if volume > 0.0 {
                index.volumes.insert(process.key.clone(), volume);
                *index
                    .by_product
                    .entry((process.key.product.clone(), process.key.location.clone()))
                    .or_default() += volume;
            }
        }
        index
    }

    pub fn warnings(&self) -> &[Error] {
        &self.warnings
    }

    pub fn volume_of(&self, key: &ProcessKey) -> f64 {
        self.volumes.get(key).copied().unwrap_or(0.0)
    }

    /// Sum of the volumes of a candidate set, used to decide whether
    /// allocation has any signal to work with.
    pub fn total<'a, I>(&self, keys: I) -> f64
    where
        I: IntoIterator<Item = &'a ProcessKey>,
    {
        keys.into_iter().map(|key| self.volume_of(key)).sum()
    }

    /// How much of `product` the processes at `location` produce, summed
    /// over process names.  This is the weight the market builder uses
    /// when averaging per-location loss factors over a region.
    pub fn product_volume_at(&self, product: &Ident, location: &Location) -> f64 {
        self.by_product
            .get(&(product.clone(), location.clone()))
            .copied()
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::producer;

    #[test]
    fn missing_and_negative_volumes_read_as_zero() {
        let a = producer(
            "electricity production, hard coal",
            "electricity",
            "DE",
            "kilowatt hour",
            60.0,
        );
        let b = producer(
            "electricity production, lignite",
            "electricity",
            "DE",
            "kilowatt hour",
            0.0,
        );
        let mut c = producer(
            "electricity production, oil",
            "electricity",
            "DE",
            "kilowatt hour",
            0.0,
        );
        c.volume = -4.0;

        let keys: Vec<_> = [&a, &b, &c].iter().map(|p| p.key.clone()).collect();
        let db = Database::new(vec![a, b, c]).unwrap();
        let index = VolumeIndex::new(&db);

        assert_eq!(60.0, index.volume_of(&keys[0]));
        assert_eq!(0.0, index.volume_of(&keys[1]));
        assert_eq!(0.0, index.volume_of(&keys[2]));
        assert_eq!(60.0, index.total(keys.iter()));

        assert_eq!(1, index.warnings().len());
        assert_eq!(ErrorCode::NegativeAmount, index.warnings()[0].code);
    }

    #[test]
    fn product_volumes_sum_over_names_at_a_location() {
        let db = Database::new(vec![
            producer("electricity production, hard coal", "electricity", "DE", "kilowatt hour", 60.0),
            producer("electricity production, lignite", "electricity", "DE", "kilowatt hour", 25.0),
            producer("electricity production, hard coal", "electricity", "PL", "kilowatt hour", 40.0),
        ])
        .unwrap();
        let index = VolumeIndex::new(&db);

        let electricity = prospect_core::canonicalize("electricity");
        assert_eq!(
            85.0,
            index.product_volume_at(&electricity, &crate::datamodel::Location::new("DE"))
        );
        assert_eq!(
            40.0,
            index.product_volume_at(&electricity, &crate::datamodel::Location::new("PL"))
        );
        assert_eq!(
            0.0,
            index.product_volume_at(&electricity, &crate::datamodel::Location::new("FR"))
        );
    }
}
