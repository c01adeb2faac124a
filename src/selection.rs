//! Category/location selections and the normalizer that keeps a minimal
//! covering set of them. Wildcards are language-neutral here; the display
//! strings ("All categories", "Koko Suomi", ...) only exist at the I/O
//! boundary in the message catalog.

use serde::{Deserialize, Serialize};

/// One level of a hierarchical selection: either "any value at this level"
/// or one concrete taxonomy name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "pick", rename_all = "snake_case")]
pub enum Pick {
    Any,
    Named { name: String },
}

impl Pick {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named { name: name.into() }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Pick::Any)
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Pick::Any => None,
            Pick::Named { name } => Some(name),
        }
    }
}

/// A category filter: category > subcategory > product type.
/// Invariant: a wildcard at some level forces wildcards below it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySelection {
    pub category: Pick,
    pub subcategory: Pick,
    pub product_type: Pick,
}

impl CategorySelection {
    pub fn any() -> Self {
        Self {
            category: Pick::Any,
            subcategory: Pick::Any,
            product_type: Pick::Any,
        }
    }

    fn chain(&self) -> [&Pick; 3] {
        [&self.category, &self.subcategory, &self.product_type]
    }
}

/// A location filter: region > city > area. Same wildcard invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSelection {
    pub region: Pick,
    pub city: Pick,
    pub area: Pick,
}

impl LocationSelection {
    pub fn whole_country() -> Self {
        Self {
            region: Pick::Any,
            city: Pick::Any,
            area: Pick::Any,
        }
    }

    fn chain(&self) -> [&Pick; 3] {
        [&self.region, &self.city, &self.area]
    }
}

/// Walk both chains top-down. A wildcard in `existing` covers everything at
/// and below that level; a wildcard in `incoming` can only be covered by a
/// wildcard higher up; equal concrete chains cover.
fn chain_covers(existing: [&Pick; 3], incoming: [&Pick; 3]) -> bool {
    for (e, n) in existing.iter().zip(incoming.iter()) {
        match (e, n) {
            (Pick::Any, _) => return true,
            (_, Pick::Any) => return false,
            (Pick::Named { name: a }, Pick::Named { name: b }) if a != b => return false,
            _ => {}
        }
    }
    true
}

/// A three-level hierarchical selection that can subsume other selections.
pub trait Covering: Sized {
    /// True if `self` is broader than or equal to `other`.
    fn covers(&self, other: &Self) -> bool;

    /// Wildcard flags from the top level down. Used as the sort key when a
    /// set is compiled or displayed: fully concrete entries first, the
    /// top-level wildcard last. The sort is stable, so concrete entries keep
    /// their insertion order.
    fn breadth_key(&self) -> (bool, bool, bool);
}

impl Covering for CategorySelection {
    fn covers(&self, other: &Self) -> bool {
        chain_covers(self.chain(), other.chain())
    }

    fn breadth_key(&self) -> (bool, bool, bool) {
        (
            self.category.is_any(),
            self.subcategory.is_any(),
            self.product_type.is_any(),
        )
    }
}

impl Covering for LocationSelection {
    fn covers(&self, other: &Self) -> bool {
        chain_covers(self.chain(), other.chain())
    }

    fn breadth_key(&self) -> (bool, bool, bool) {
        (self.region.is_any(), self.city.is_any(), self.area.is_any())
    }
}

/// Fold one more user choice into the accumulated set, keeping it minimal:
/// an incoming selection already covered by the set is discarded, and the
/// incoming one evicts every narrower entry it subsumes. A top-level wildcard
/// therefore collapses the whole set to a singleton.
pub fn normalize_add<T: Covering>(set: &mut Vec<T>, incoming: T) {
    if set.iter().any(|existing| existing.covers(&incoming)) {
        return;
    }
    set.retain(|existing| !incoming.covers(existing));
    set.push(incoming);
}

/// Order a finished set for compilation and display.
pub fn sort_for_output<T: Covering>(set: &mut [T]) {
    set.sort_by_key(|s| s.breadth_key());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(region: &str, city: &str, area: &str) -> LocationSelection {
        let pick = |s: &str| {
            if s == "*" {
                Pick::Any
            } else {
                Pick::named(s)
            }
        };
        LocationSelection {
            region: pick(region),
            city: pick(city),
            area: pick(area),
        }
    }

    fn assert_minimal(set: &[LocationSelection]) {
        for (i, a) in set.iter().enumerate() {
            for (j, b) in set.iter().enumerate() {
                if i != j {
                    assert!(!a.covers(b), "{:?} covers {:?}", a, b);
                }
            }
        }
    }

    #[test]
    fn test_whole_country_collapses_everything() {
        let mut set = Vec::new();
        normalize_add(&mut set, loc("Uusimaa", "Helsinki", "Kallio"));
        normalize_add(&mut set, loc("Pirkanmaa", "*", "*"));
        normalize_add(&mut set, loc("*", "*", "*"));
        assert_eq!(set, vec![loc("*", "*", "*")]);

        // and nothing narrower gets past it afterwards
        normalize_add(&mut set, loc("Uusimaa", "Espoo", "*"));
        assert_eq!(set, vec![loc("*", "*", "*")]);
    }

    #[test]
    fn test_all_cities_evicts_same_region_only() {
        let mut set = Vec::new();
        normalize_add(&mut set, loc("Uusimaa", "Helsinki", "*"));
        normalize_add(&mut set, loc("Pirkanmaa", "Tampere", "*"));
        normalize_add(&mut set, loc("Uusimaa", "*", "*"));
        assert_eq!(
            set,
            vec![loc("Pirkanmaa", "Tampere", "*"), loc("Uusimaa", "*", "*")]
        );
    }

    #[test]
    fn test_all_areas_evicts_same_city_only() {
        let mut set = Vec::new();
        normalize_add(&mut set, loc("Uusimaa", "Helsinki", "Kallio"));
        normalize_add(&mut set, loc("Uusimaa", "Espoo", "Otaniemi"));
        normalize_add(&mut set, loc("Uusimaa", "Helsinki", "*"));
        assert_eq!(
            set,
            vec![
                loc("Uusimaa", "Espoo", "Otaniemi"),
                loc("Uusimaa", "Helsinki", "*")
            ]
        );
    }

    #[test]
    fn test_covered_concrete_incoming_is_discarded() {
        let mut set = Vec::new();
        normalize_add(&mut set, loc("Uusimaa", "*", "*"));
        normalize_add(&mut set, loc("Uusimaa", "Helsinki", "Kallio"));
        assert_eq!(set, vec![loc("Uusimaa", "*", "*")]);

        normalize_add(&mut set, loc("Uusimaa", "Helsinki", "Kallio"));
        normalize_add(&mut set, loc("Uusimaa", "Helsinki", "Kallio"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_no_redundancy_over_arbitrary_sequences() {
        let choices = [
            loc("Uusimaa", "Helsinki", "Kallio"),
            loc("Uusimaa", "Helsinki", "*"),
            loc("Pirkanmaa", "Tampere", "*"),
            loc("Uusimaa", "*", "*"),
            loc("Pirkanmaa", "Nokia", "*"),
            loc("Uusimaa", "Espoo", "Otaniemi"),
        ];
        // every prefix of the stream must leave a minimal set
        for end in 1..=choices.len() {
            let mut set = Vec::new();
            for c in &choices[..end] {
                normalize_add(&mut set, c.clone());
                assert_minimal(&set);
            }
        }
    }

    #[test]
    fn test_output_sort_puts_wildcards_last() {
        let mut set = vec![
            loc("*", "*", "*"),
            loc("Uusimaa", "Helsinki", "Kallio"),
            loc("Pirkanmaa", "*", "*"),
            loc("Uusimaa", "Espoo", "*"),
        ];
        sort_for_output(&mut set);
        assert_eq!(
            set,
            vec![
                loc("Uusimaa", "Helsinki", "Kallio"),
                loc("Uusimaa", "Espoo", "*"),
                loc("Pirkanmaa", "*", "*"),
                loc("*", "*", "*"),
            ]
        );
    }

    #[test]
    fn test_category_subsumption_mirrors_locations() {
        let concrete = CategorySelection {
            category: Pick::named("Electronics"),
            subcategory: Pick::named("Phones"),
            product_type: Pick::named("Smartphones"),
        };
        let sub_wild = CategorySelection {
            category: Pick::named("Electronics"),
            subcategory: Pick::Any,
            product_type: Pick::Any,
        };
        assert!(sub_wild.covers(&concrete));
        assert!(!concrete.covers(&sub_wild));
        assert!(CategorySelection::any().covers(&sub_wild));

        let mut set = vec![concrete.clone()];
        normalize_add(&mut set, sub_wild.clone());
        assert_eq!(set, vec![sub_wild]);
    }
}
