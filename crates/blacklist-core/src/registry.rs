//! Stable-id indirection between scheduled events and live game objects.
//!
//! Scheduled events carry bare integers. Object identity does not survive a
//! save/reload, so every fired event is resolved back through this registry;
//! a miss means the object was released through another path.

use std::collections::BTreeMap;

use contracts::{EntityId, EntityRef, ResourceDef, ResourceHash};

#[derive(Debug, Clone, Default)]
pub struct IdentityRegistry {
    entities: BTreeMap<EntityId, EntityRef>,
    resources: BTreeMap<ResourceHash, ResourceDef>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates the entity with its id. Re-registering replaces the stored
    /// reference so label changes are picked up.
    pub fn register(&mut self, entity: &EntityRef) {
        match self.entities.get_mut(&entity.id) {
            Some(existing) if existing == entity => {}
            Some(existing) => *existing = entity.clone(),
            None => {
                self.entities.insert(entity.id, entity.clone());
            }
        }
    }

    pub fn register_hash(&mut self, resource: &ResourceDef) {
        match self.resources.get_mut(&resource.hash) {
            Some(existing) if existing == resource => {}
            Some(existing) => *existing = resource.clone(),
            None => {
                self.resources.insert(resource.hash, resource.clone());
            }
        }
    }

    pub fn resolve(&self, id: EntityId) -> Option<&EntityRef> {
        self.entities.get(&id)
    }

    pub fn resolve_hash(&self, hash: ResourceHash) -> Option<&ResourceDef> {
        self.resources.get(&hash)
    }

    pub fn unregister(&mut self, id: EntityId) -> Option<EntityRef> {
        self.entities.remove(&id)
    }

    pub fn unregister_hash(&mut self, hash: ResourceHash) -> Option<ResourceDef> {
        self.resources.remove(&hash)
    }

    /// Drops every mapping the predicates reject. Used by removal sweeps.
    pub fn retain(
        &mut self,
        mut keep_entity: impl FnMut(EntityId) -> bool,
        mut keep_resource: impl FnMut(ResourceHash) -> bool,
    ) {
        self.entities.retain(|id, _| keep_entity(*id));
        self.resources.retain(|hash, _| keep_resource(*hash));
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    pub fn resource_hashes(&self) -> impl Iterator<Item = ResourceHash> + '_ {
        self.resources.keys().copied()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.resources.clear();
    }
}
