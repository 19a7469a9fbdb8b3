use std::collections::{btree_set, BTreeSet};

use crate::ResourceReference;

/// Unordered set of object references
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InventorySet(BTreeSet<ResourceReference>);

impl InventorySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: ResourceReference) -> bool {
        self.0.insert(reference)
    }

    pub fn remove(&mut self, reference: &ResourceReference) -> bool {
        self.0.remove(reference)
    }

    pub fn contains(&self, reference: &ResourceReference) -> bool {
        self.0.contains(reference)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_set::Iter<'_, ResourceReference> {
        self.0.iter()
    }

    /// Members of `self` which are absent in `other`
    pub fn difference(&self, other: &Self) -> Self {
        self.0.difference(&other.0).cloned().collect()
    }

    pub fn union(&self, other: &Self) -> Self {
        self.0.union(&other.0).cloned().collect()
    }
}

impl FromIterator<ResourceReference> for InventorySet {
    fn from_iter<T: IntoIterator<Item = ResourceReference>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<ResourceReference> for InventorySet {
    fn extend<T: IntoIterator<Item = ResourceReference>>(&mut self, iter: T) {
        self.0.extend(iter)
    }
}

impl IntoIterator for InventorySet {
    type Item = ResourceReference;
    type IntoIter = btree_set::IntoIter<ResourceReference>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a InventorySet {
    type Item = &'a ResourceReference;
    type IntoIter = btree_set::Iter<'a, ResourceReference>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
