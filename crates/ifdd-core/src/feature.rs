//! Feature identifiers and the feature catalogue.
//!
//! Every feature known to a representation has a [`FeatureId`] and a
//! [`BaseSet`]: the set of base features whose simultaneous activation the
//! feature stands for. Base features are singletons; discovered features
//! (conjunctions) cover two or more base features.
//!
//! The [`FeatureCatalogue`] owns all entries, indexed both by id and by base
//! set, so that a conjunction can be promoted at most once.

use std::{cmp::Reverse, collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

use crate::error::UnknownFeatureError;

/// Index of a feature in the catalogue and in every weight vector.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FeatureId(usize);

impl FeatureId {
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<usize> for FeatureId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

/// Sorted, duplicate-free set of base feature ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaseSet(Vec<FeatureId>);

impl BaseSet {
    #[must_use]
    pub fn singleton(id: FeatureId) -> Self {
        Self(vec![id])
    }

    /// Builds a set from arbitrary ids, sorting and removing duplicates.
    #[must_use]
    pub fn from_ids<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = FeatureId>,
    {
        let mut ids = ids.into_iter().collect::<Vec<_>>();
        ids.sort_unstable();
        ids.dedup();
        Self(ids)
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut merged = Vec::with_capacity(self.0.len() + other.0.len());
        let (mut a, mut b) = (self.0.iter().peekable(), other.0.iter().peekable());
        loop {
            match (a.peek(), b.peek()) {
                (Some(&&x), Some(&&y)) => {
                    if x <= y {
                        merged.push(x);
                        a.next();
                        if x == y {
                            b.next();
                        }
                    } else {
                        merged.push(y);
                        b.next();
                    }
                }
                (Some(&&x), None) => {
                    merged.push(x);
                    a.next();
                }
                (None, Some(&&y)) => {
                    merged.push(y);
                    b.next();
                }
                (None, None) => break,
            }
        }
        Self(merged)
    }

    /// Returns `true` if every member of `self` appears in the sorted slice
    /// `superset`.
    #[must_use]
    pub fn is_subset_of(&self, superset: &[FeatureId]) -> bool {
        debug_assert!(superset.is_sorted());
        let mut rest = superset;
        for id in &self.0 {
            match rest.binary_search(id) {
                Ok(pos) => rest = &rest[pos + 1..],
                Err(_) => return false,
            }
        }
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[FeatureId] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = FeatureId> + '_ {
        self.0.iter().copied()
    }

    pub(crate) fn is_canonical(&self) -> bool {
        self.0.windows(2).all(|w| w[0] < w[1])
    }
}

impl fmt::Display for BaseSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", id.index())?;
        }
        f.write_str("}")
    }
}

/// How a catalogue entry came to exist.
#[derive(Debug, Clone, Copy, PartialEq, derive_more::IsVariant)]
pub enum FeatureOrigin {
    /// Created at initialization from a discretization bin.
    Base,
    /// Promoted from a candidate conjunction.
    Discovered {
        /// The two active features whose union formed this conjunction.
        parents: [FeatureId; 2],
        /// Discovery step at which the feature was promoted.
        discovered_at: u64,
        /// Relevance that crossed the discovery threshold.
        relevance: f64,
    },
}

impl FeatureOrigin {
    #[must_use]
    pub fn parents(&self) -> Option<[FeatureId; 2]> {
        match self {
            Self::Base => None,
            Self::Discovered { parents, .. } => Some(*parents),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogueEntry {
    pub id: FeatureId,
    pub base_set: BaseSet,
    pub origin: FeatureOrigin,
}

/// Every known feature, base and discovered.
///
/// Ids are dense: base features occupy `0..base_count` and discovered
/// features are appended in promotion order.
#[derive(Debug, Clone)]
pub struct FeatureCatalogue {
    base_count: usize,
    entries: Vec<CatalogueEntry>,
    by_set: HashMap<BaseSet, FeatureId>,
    // discovered ids ordered by base-set size (largest first), then newest first
    activation_order: Vec<FeatureId>,
}

impl FeatureCatalogue {
    #[must_use]
    pub fn new(base_count: usize) -> Self {
        let entries = (0..base_count)
            .map(|i| CatalogueEntry {
                id: FeatureId(i),
                base_set: BaseSet::singleton(FeatureId(i)),
                origin: FeatureOrigin::Base,
            })
            .collect::<Vec<_>>();
        let by_set = entries
            .iter()
            .map(|e| (e.base_set.clone(), e.id))
            .collect();
        Self {
            base_count,
            entries,
            by_set,
            activation_order: vec![],
        }
    }

    /// Total number of features, base and discovered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn base_count(&self) -> usize {
        self.base_count
    }

    #[must_use]
    pub fn discovered_count(&self) -> usize {
        self.entries.len() - self.base_count
    }

    #[must_use]
    pub fn next_id(&self) -> FeatureId {
        FeatureId(self.entries.len())
    }

    pub fn get(&self, id: FeatureId) -> Result<&CatalogueEntry, UnknownFeatureError> {
        self.entries.get(id.0).ok_or(UnknownFeatureError {
            id,
            known: self.entries.len(),
        })
    }

    pub fn base_set(&self, id: FeatureId) -> Result<&BaseSet, UnknownFeatureError> {
        self.get(id).map(|e| &e.base_set)
    }

    #[must_use]
    pub fn lookup(&self, base_set: &BaseSet) -> Option<FeatureId> {
        self.by_set.get(base_set).copied()
    }

    /// Returns an error for the first id in `ids` that is not a base feature.
    pub fn check_base(&self, ids: &[FeatureId]) -> Result<(), UnknownFeatureError> {
        match ids.iter().find(|id| id.0 >= self.base_count) {
            Some(&id) => Err(UnknownFeatureError {
                id,
                known: self.base_count,
            }),
            None => Ok(()),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogueEntry> {
        self.entries.iter()
    }

    pub(crate) fn as_slice(&self) -> &[CatalogueEntry] {
        &self.entries
    }

    pub fn discovered(&self) -> impl Iterator<Item = &CatalogueEntry> {
        self.entries[self.base_count..].iter()
    }

    /// Discovered features in the order they are tried during activation.
    #[must_use]
    pub fn activation_order(&self) -> &[FeatureId] {
        &self.activation_order
    }

    /// Appends a discovered feature and returns its id.
    ///
    /// The caller guarantees that `base_set` is not already catalogued.
    pub(crate) fn insert_discovered(
        &mut self,
        base_set: BaseSet,
        parents: [FeatureId; 2],
        discovered_at: u64,
        relevance: f64,
    ) -> FeatureId {
        debug_assert!(!self.by_set.contains_key(&base_set));
        let id = self.next_id();
        let key = (Reverse(base_set.len()), Reverse(id));
        let pos = self.activation_order.partition_point(|other| {
            let len = self.entries[other.0].base_set.len();
            (Reverse(len), Reverse(*other)) < key
        });
        self.activation_order.insert(pos, id);
        self.by_set.insert(base_set.clone(), id);
        self.entries.push(CatalogueEntry {
            id,
            base_set,
            origin: FeatureOrigin::Discovered {
                parents,
                discovered_at,
                relevance,
            },
        });
        id
    }
}
