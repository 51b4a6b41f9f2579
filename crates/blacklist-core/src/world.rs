use contracts::{EntityId, EntityRef, ResourceDef, ResourceHash};

/// What the blacklist needs to know about the game world it runs inside.
///
/// `entity` and `resource` re-resolve stable ids after a reload; the liveness
/// predicate drives dead-entity cleanup.
pub trait WorldView {
    fn entity(&self, id: EntityId) -> Option<EntityRef>;

    fn resource(&self, hash: ResourceHash) -> Option<ResourceDef>;

    fn is_destroyed_or_dead(&self, entity: &EntityRef) -> bool;
}

impl<W: WorldView + ?Sized> WorldView for &W {
    fn entity(&self, id: EntityId) -> Option<EntityRef> {
        (**self).entity(id)
    }

    fn resource(&self, hash: ResourceHash) -> Option<ResourceDef> {
        (**self).resource(hash)
    }

    fn is_destroyed_or_dead(&self, entity: &EntityRef) -> bool {
        (**self).is_destroyed_or_dead(entity)
    }
}
