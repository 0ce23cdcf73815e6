//! Associations between logical processes and the instance groups running them.

use crate::mapping::ProcessId;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Identifies a group of workload instances scheduled together.
#[derive(Clone, Debug, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub struct InstanceGroupId(pub Arc<str>);

impl InstanceGroupId {
    pub fn new(id: impl ToString) -> Self {
        Self(Arc::from(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for InstanceGroupId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&'_ str> for InstanceGroupId {
    fn from(s: &'_ str) -> Self {
        Self(Arc::from(s))
    }
}

impl std::borrow::Borrow<str> for InstanceGroupId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InstanceGroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The instance groups currently implementing one logical process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessAssociation {
    pub process_id: ProcessId,
    pub instance_groups: Vec<InstanceGroupId>,
}

impl ProcessAssociation {
    pub fn new<I, G>(process_id: impl Into<ProcessId>, instance_groups: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<InstanceGroupId>,
    {
        Self {
            process_id: process_id.into(),
            instance_groups: instance_groups.into_iter().map(Into::into).collect(),
        }
    }
}

/// Looks up the association for a single logical process.
pub trait AssociationLookup: Send + Sync {
    fn get(&self, process_id: &ProcessId) -> Option<ProcessAssociation>;
}

pub type SharedAssociationLookup = Arc<dyn AssociationLookup>;

/// Concurrent store of process associations.
#[derive(Default)]
pub struct ProcessAssociationsRepo {
    associations: RwLock<HashMap<ProcessId, ProcessAssociation>>,
}

impl ProcessAssociationsRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, association: ProcessAssociation) {
        self.associations
            .write()
            .unwrap()
            .insert(association.process_id.clone(), association);
    }

    pub fn delete(&self, process_id: &ProcessId) {
        self.associations.write().unwrap().remove(process_id);
    }

    /// Replaces the full contents of the store.
    pub fn sync(&self, associations: Vec<ProcessAssociation>) {
        let replacement = associations
            .into_iter()
            .map(|association| (association.process_id.clone(), association))
            .collect();
        *self.associations.write().unwrap() = replacement;
    }

    pub fn get(&self, process_id: &ProcessId) -> Option<ProcessAssociation> {
        self.associations.read().unwrap().get(process_id).cloned()
    }

    pub fn list(&self) -> HashMap<ProcessId, Vec<InstanceGroupId>> {
        self.associations
            .read()
            .unwrap()
            .iter()
            .map(|(id, association)| (id.clone(), association.instance_groups.clone()))
            .collect()
    }
}

impl AssociationLookup for ProcessAssociationsRepo {
    fn get(&self, process_id: &ProcessId) -> Option<ProcessAssociation> {
        ProcessAssociationsRepo::get(self, process_id)
    }
}
