use std::collections::BTreeMap;

use blacklist_core::WorldView;
use contracts::{EntityId, EntityRef, ResourceDef, ResourceHash, RosterEntry};

/// Minimal game world: actors with a liveness flag and a resource catalog.
#[derive(Debug, Clone)]
pub struct Roster {
    entities: BTreeMap<EntityId, RosterEntry>,
    resources: BTreeMap<ResourceHash, ResourceDef>,
    next_entity_id: u64,
}

impl Default for Roster {
    fn default() -> Self {
        Self {
            entities: BTreeMap::new(),
            resources: BTreeMap::new(),
            next_entity_id: 1,
        }
    }
}

impl Roster {
    pub fn restore(
        entries: impl IntoIterator<Item = RosterEntry>,
        resources: impl IntoIterator<Item = ResourceDef>,
        next_entity_id: u64,
    ) -> Self {
        let entities = entries
            .into_iter()
            .map(|entry| (entry.entity.id, entry))
            .collect::<BTreeMap<_, _>>();
        let floor = entities
            .keys()
            .next_back()
            .map_or(1, |id| id.get().saturating_add(1));
        Self {
            entities,
            resources: resources
                .into_iter()
                .map(|resource| (resource.hash, resource))
                .collect(),
            next_entity_id: next_entity_id.max(floor),
        }
    }

    pub fn spawn(&mut self, label: impl Into<String>) -> EntityRef {
        let entity = EntityRef::new(self.next_entity_id, label);
        self.next_entity_id += 1;
        self.entities.insert(
            entity.id,
            RosterEntry {
                entity: entity.clone(),
                alive: true,
            },
        );
        entity
    }

    /// Returns the updated entry, or `None` for an unknown id.
    pub fn kill(&mut self, id: EntityId) -> Option<&RosterEntry> {
        let entry = self.entities.get_mut(&id)?;
        entry.alive = false;
        Some(entry)
    }

    /// Defining the same label twice yields the same definition.
    pub fn define_resource(&mut self, label: impl Into<String>) -> ResourceDef {
        let resource = ResourceDef::from_label(label);
        self.resources
            .entry(resource.hash)
            .or_insert_with(|| resource.clone())
            .clone()
    }

    pub fn get(&self, id: EntityId) -> Option<&RosterEntry> {
        self.entities.get(&id)
    }

    pub fn get_resource(&self, hash: ResourceHash) -> Option<&ResourceDef> {
        self.resources.get(&hash)
    }

    pub fn entries(&self) -> impl Iterator<Item = &RosterEntry> + '_ {
        self.entities.values()
    }

    pub fn resources(&self) -> impl Iterator<Item = &ResourceDef> + '_ {
        self.resources.values()
    }

    pub fn next_entity_id(&self) -> u64 {
        self.next_entity_id
    }
}

impl WorldView for Roster {
    fn entity(&self, id: EntityId) -> Option<EntityRef> {
        self.entities.get(&id).map(|entry| entry.entity.clone())
    }

    fn resource(&self, hash: ResourceHash) -> Option<ResourceDef> {
        self.resources.get(&hash).cloned()
    }

    fn is_destroyed_or_dead(&self, entity: &EntityRef) -> bool {
        !self
            .entities
            .get(&entity.id)
            .is_some_and(|entry| entry.alive)
    }
}
