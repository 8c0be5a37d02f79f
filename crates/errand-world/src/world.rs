//! [`World`] – the in-process scene graph and its shared handle.
//!
//! Entities live in an arena indexed by [`EntityId`] and are looked up by
//! unique name in O(1).  Poses are stored in world space, so re-parenting
//! never moves an entity and moving a parent does not drag its children.
//!
//! # Room containers
//!
//! When an object is placed, ownership moves to the `object` container of
//! the room that owns the target surface.  A room root is the nearest
//! ancestor whose lower-cased name equals a configured room name or starts
//! with it followed by `_`, a space, or `(` (so `lab`, `Lab_2` and
//! `library (east)` all qualify).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use errand_types::{Capability, ErrandError};
use tracing::debug;

use crate::devices::{DoorController, HasOnState, SwitchController};
use crate::entity::{Entity, EntityId, PartKind};
use crate::geometry::{Aabb, Pose, Vec3};
use crate::registry::{ProbeHit, SurfaceProbe, WorldRegistry};

/// Lower-case names of the nodes that act as room roots.
pub const ROOM_ROOTS: [&str; 4] = ["lab", "classroom", "hallway", "library"];

/// Name of the per-room node that owns loose objects.
pub const OBJECT_CONTAINER: &str = "object";

#[derive(Debug, Clone, Default)]
pub struct World {
    entities: Vec<Entity>,
    by_name: HashMap<String, EntityId>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `entity` under `parent` (or at the root).
    ///
    /// # Errors
    ///
    /// Returns [`ErrandError::PreconditionViolation`] when the name is already
    /// taken, and [`ErrandError::TargetNotFound`] for an unknown parent.
    pub fn spawn(&mut self, entity: Entity, parent: Option<EntityId>) -> Result<EntityId, ErrandError> {
        if self.by_name.contains_key(&entity.name) {
            return Err(ErrandError::PreconditionViolation(format!(
                "duplicate entity name '{}'",
                entity.name
            )));
        }
        let name = entity.name.clone();
        let id = self.insert(entity, parent)?;
        self.by_name.insert(name, id);
        Ok(id)
    }

    /// Insert without registering the name (structural nodes such as room
    /// containers, whose names repeat across rooms).
    fn insert(&mut self, mut entity: Entity, parent: Option<EntityId>) -> Result<EntityId, ErrandError> {
        if let Some(p) = parent {
            self.get(p)?;
        }
        let id = EntityId(self.entities.len());
        entity.parent = parent;
        entity.children.clear();
        self.entities.push(entity);
        if let Some(p) = parent {
            self.entities[p.0].children.push(id);
        }
        Ok(id)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id.0)
    }

    fn get(&self, id: EntityId) -> Result<&Entity, ErrandError> {
        self.entities
            .get(id.0)
            .ok_or_else(|| ErrandError::TargetNotFound(id.to_string()))
    }

    fn get_mut(&mut self, id: EntityId) -> Result<&mut Entity, ErrandError> {
        self.entities
            .get_mut(id.0)
            .ok_or_else(|| ErrandError::TargetNotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// `id` followed by all of its descendants, breadth-first.
    pub fn subtree(&self, id: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([id]);
        while let Some(next) = queue.pop_front() {
            if let Some(e) = self.entities.get(next.0) {
                out.push(next);
                queue.extend(e.children.iter().copied());
            }
        }
        out
    }

    // ── Mutation ──────────────────────────────────────────────────────────────

    pub fn set_pose(&mut self, id: EntityId, pose: Pose) -> Result<(), ErrandError> {
        self.get_mut(id)?.pose = pose;
        Ok(())
    }

    pub fn set_physics(&mut self, id: EntityId, enabled: bool) -> Result<(), ErrandError> {
        self.get_mut(id)?.physics = enabled;
        Ok(())
    }

    /// Move `id` under `new_parent`, keeping its world pose.
    ///
    /// # Errors
    ///
    /// Returns [`ErrandError::PreconditionViolation`] if the move would make an
    /// entity its own ancestor.
    pub fn reparent(&mut self, id: EntityId, new_parent: Option<EntityId>) -> Result<(), ErrandError> {
        self.get(id)?;
        if let Some(p) = new_parent {
            self.get(p)?;
            if self.is_descendant_of(p, id) {
                return Err(ErrandError::PreconditionViolation(format!(
                    "cannot parent {id} under its own descendant {p}"
                )));
            }
        }
        if let Some(old) = self.entities[id.0].parent {
            self.entities[old.0].children.retain(|c| *c != id);
        }
        self.entities[id.0].parent = new_parent;
        if let Some(p) = new_parent {
            self.entities[p.0].children.push(id);
        }
        Ok(())
    }

    /// Take `object` into `holder`'s hand: physics off, parented to the
    /// holder and posed at `grip`.
    pub fn attach(&mut self, object: EntityId, holder: EntityId, grip: Pose) -> Result<(), ErrandError> {
        self.set_physics(object, false)?;
        self.reparent(object, Some(holder))?;
        self.set_pose(object, grip)
    }

    /// Release `object` onto `surface` at `pose`.
    ///
    /// Physics is re-enabled and ownership moves to the `object` container of
    /// the surface's room (created on demand).  Without a room the object is
    /// re-parented to the root.  Returns the new parent.
    pub fn place_entity(
        &mut self,
        object: EntityId,
        pose: Pose,
        surface: EntityId,
    ) -> Result<Option<EntityId>, ErrandError> {
        self.get(surface)?;
        self.set_pose(object, pose)?;
        self.set_physics(object, true)?;
        let container = match self.room_root_of(surface) {
            Some(room) => Some(self.object_container(room)?),
            None => None,
        };
        self.reparent(object, container)?;
        debug!(
            object = self.entities[object.0].name.as_str(),
            surface = self.entities[surface.0].name.as_str(),
            "entity placed"
        );
        Ok(container)
    }

    /// The nearest ancestor (or `id` itself) recognised as a room root.
    pub fn room_root_of(&self, id: EntityId) -> Option<EntityId> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let entity = self.entities.get(current.0)?;
            let name = entity.name.to_lowercase();
            if ROOM_ROOTS.iter().any(|r| name_variant_matches(&name, r)) {
                return Some(current);
            }
            cursor = entity.parent;
        }
        None
    }

    fn object_container(&mut self, room: EntityId) -> Result<EntityId, ErrandError> {
        let existing = self.get(room)?.children.iter().copied().find(|c| {
            name_variant_matches(&self.entities[c.0].name.to_lowercase(), OBJECT_CONTAINER)
        });
        match existing {
            Some(c) => Ok(c),
            None => {
                let origin = self.entities[room.0].pose.position;
                self.insert(Entity::new(OBJECT_CONTAINER).at(origin), Some(room))
            }
        }
    }

    /// True when any switch bound to `light` is on.
    pub fn is_lit(&self, light: &str) -> bool {
        self.entities.iter().filter_map(|e| e.switch.as_ref()).any(|s| {
            s.is_on() == Some(true) && s.lights().iter().any(|l| l.eq_ignore_ascii_case(light))
        })
    }
}

fn name_variant_matches(lower_name: &str, root: &str) -> bool {
    lower_name == root
        || lower_name
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with(['_', ' ', '(']))
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry / probe implementations
// ─────────────────────────────────────────────────────────────────────────────

impl WorldRegistry for World {
    fn find_by_name(&self, name: &str) -> Option<EntityId> {
        self.by_name.get(name).copied()
    }

    fn find_ignore_case(&self, name: &str, capability: Capability) -> Option<EntityId> {
        self.entities
            .iter()
            .enumerate()
            .find(|(_, e)| {
                e.name.eq_ignore_ascii_case(name) && e.own_capabilities().any(|c| c == capability)
            })
            .map(|(i, _)| EntityId(i))
    }

    fn name_of(&self, id: EntityId) -> Option<&str> {
        self.entities.get(id.0).map(|e| e.name.as_str())
    }

    fn pose_of(&self, id: EntityId) -> Option<Pose> {
        self.entities.get(id.0).map(|e| e.pose)
    }

    fn bounds_of(&self, id: EntityId) -> Option<Aabb> {
        self.subtree(id)
            .into_iter()
            .flat_map(|i| self.entities[i.0].world_parts())
            .map(|(_, b)| b)
            .reduce(|acc, b| acc.union(&b))
    }

    fn capabilities_of(&self, id: EntityId) -> HashSet<Capability> {
        self.entities
            .get(id.0)
            .map(|e| e.own_capabilities().collect())
            .unwrap_or_default()
    }

    fn find_capable(&self, id: EntityId, capability: Capability) -> Option<EntityId> {
        self.subtree(id)
            .into_iter()
            .find(|i| self.entities[i.0].own_capabilities().any(|c| c == capability))
    }

    fn door_mut(&mut self, id: EntityId) -> Option<&mut dyn DoorController> {
        self.entities
            .get_mut(id.0)?
            .door
            .as_mut()
            .map(|d| d as &mut dyn DoorController)
    }

    fn switch_mut(&mut self, id: EntityId) -> Option<&mut dyn SwitchController> {
        self.entities
            .get_mut(id.0)?
            .switch
            .as_mut()
            .map(|s| s as &mut dyn SwitchController)
    }
}

impl SurfaceProbe for World {
    fn cast_down(&self, origin: Vec3, max_distance: f32) -> Option<ProbeHit> {
        let mut best: Option<ProbeHit> = None;
        for (i, entity) in self.entities.iter().enumerate() {
            if !entity.physics {
                continue;
            }
            for (kind, b) in entity.world_parts() {
                if kind != PartKind::Collidable || !b.contains_xz(origin) {
                    continue;
                }
                let drop = origin.y - b.max.y;
                if drop < 0.0 || drop > max_distance {
                    continue;
                }
                if best.is_none_or(|hit| b.max.y > hit.point.y) {
                    best = Some(ProbeHit {
                        point: Vec3::new(origin.x, b.max.y, origin.z),
                        entity: EntityId(i),
                    });
                }
            }
        }
        best
    }

    fn is_descendant_of(&self, id: EntityId, ancestor: EntityId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.entities.get(current.0).and_then(|e| e.parent);
        }
        false
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared handle
// ─────────────────────────────────────────────────────────────────────────────

/// Cheaply cloneable handle to a [`World`] shared between the executor and
/// the simulated controllers.
///
/// A poisoned lock is recovered rather than propagated: the world holds no
/// invariant that a panicking writer could leave half-applied across calls.
#[derive(Debug, Clone, Default)]
pub struct SharedWorld(Arc<RwLock<World>>);

impl SharedWorld {
    pub fn new(world: World) -> Self {
        Self(Arc::new(RwLock::new(world)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, World> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, World> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{Door, HasOpenState, Switch};

    fn room_with_desk() -> (World, EntityId, EntityId) {
        let mut w = World::new();
        let lab = w.spawn(Entity::new("Lab_Main"), None).unwrap();
        let desk = w
            .spawn(
                Entity::new("desk_01")
                    .at(Vec3::new(3.0, 0.0, 0.0))
                    .with_collider(Vec3::new(0.0, 0.75, 0.0), Vec3::new(1.0, 0.05, 0.5))
                    .surface(),
                Some(lab),
            )
            .unwrap();
        (w, lab, desk)
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let (mut w, _, _) = room_with_desk();
        let err = w.spawn(Entity::new("desk_01"), None).unwrap_err();
        assert!(matches!(err, ErrandError::PreconditionViolation(_)));
    }

    #[test]
    fn bounds_aggregate_descendants() {
        let (mut w, _, desk) = room_with_desk();
        w.spawn(
            Entity::new("desk_leg")
                .at(Vec3::new(3.9, 0.0, 0.0))
                .with_renderer(Vec3::new(0.0, 0.35, 0.0), Vec3::new(0.05, 0.35, 0.05)),
            Some(desk),
        )
        .unwrap();
        let b = w.bounds_of(desk).unwrap();
        assert!((b.min.y - 0.0).abs() < 1e-5);
        assert!((b.max.y - 0.8).abs() < 1e-5);
        assert!(w.bounds_of(w.find_by_name("Lab_Main").unwrap()).is_some());
    }

    #[test]
    fn bounds_absent_without_geometry() {
        let mut w = World::new();
        let id = w.spawn(Entity::new("ghost"), None).unwrap();
        assert!(w.bounds_of(id).is_none());
    }

    #[test]
    fn capability_found_in_descendant() {
        let mut w = World::new();
        let frame = w.spawn(Entity::new("door_03"), None).unwrap();
        let leaf = w
            .spawn(Entity::new("door_03_leaf").with_door(Door::closed()), Some(frame))
            .unwrap();
        assert!(w.capabilities_of(frame).is_empty());
        assert_eq!(w.find_capable(frame, Capability::Door), Some(leaf));
        assert!(w.find_capable(frame, Capability::Switch).is_none());

        w.door_mut(leaf).unwrap().open().unwrap();
        assert_eq!(w.entity(leaf).unwrap().door().unwrap().is_open(), Some(true));
    }

    #[test]
    fn case_insensitive_scan_requires_capability() {
        let mut w = World::new();
        let sw = w
            .spawn(Entity::new("Lamp_Switch").with_switch(Switch::off()), None)
            .unwrap();
        w.spawn(Entity::new("lamp_switch_box"), None).unwrap();
        assert_eq!(w.find_ignore_case("LAMP_SWITCH", Capability::Switch), Some(sw));
        assert!(w.find_ignore_case("lamp_switch_box", Capability::Switch).is_none());
    }

    #[test]
    fn placing_moves_object_into_room_container() {
        let (mut w, lab, desk) = room_with_desk();
        let robot = w.spawn(Entity::new("robot"), None).unwrap();
        let laptop = w
            .spawn(
                Entity::new("laptop").with_collider(Vec3::zero(), Vec3::new(0.2, 0.02, 0.15)),
                None,
            )
            .unwrap();
        w.attach(laptop, robot, Pose::default()).unwrap();
        assert!(!w.entity(laptop).unwrap().physics_enabled());

        let pose = Pose::at(Vec3::new(3.0, 0.85, 0.0));
        let container = w.place_entity(laptop, pose, desk).unwrap().unwrap();
        assert_eq!(w.entity(container).unwrap().name(), OBJECT_CONTAINER);
        assert_eq!(w.entity(container).unwrap().parent(), Some(lab));
        assert_eq!(w.entity(laptop).unwrap().parent(), Some(container));
        assert!(w.entity(laptop).unwrap().physics_enabled());
        assert!(!w.entity(robot).unwrap().children().contains(&laptop));

        // A second placement reuses the same container.
        let again = w.place_entity(laptop, pose, desk).unwrap();
        assert_eq!(again, Some(container));
    }

    #[test]
    fn placing_without_room_goes_to_root() {
        let mut w = World::new();
        let shelf = w.spawn(Entity::new("shelf").surface(), None).unwrap();
        let cup = w.spawn(Entity::new("cup"), Some(shelf)).unwrap();
        let parent = w.place_entity(cup, Pose::default(), shelf).unwrap();
        assert!(parent.is_none());
        assert!(w.entity(cup).unwrap().parent().is_none());
    }

    #[test]
    fn room_root_name_variants() {
        assert!(name_variant_matches("lab", "lab"));
        assert!(name_variant_matches("lab_2", "lab"));
        assert!(name_variant_matches("library (east)", "library"));
        assert!(!name_variant_matches("laboratory", "lab"));
    }

    #[test]
    fn reparent_rejects_cycles() {
        let (mut w, lab, desk) = room_with_desk();
        assert!(w.reparent(lab, Some(desk)).is_err());
    }

    #[test]
    fn probe_hits_highest_collider_below_origin() {
        let (mut w, _, desk) = room_with_desk();
        w.spawn(
            Entity::new("floor").with_collider(Vec3::zero(), Vec3::new(50.0, 0.01, 50.0)),
            None,
        )
        .unwrap();
        let hit = w.cast_down(Vec3::new(3.0, 2.3, 0.0), 3.0).unwrap();
        assert_eq!(hit.entity, desk);
        assert!((hit.point.y - 0.8).abs() < 1e-5);
        assert!(w.is_descendant_of(desk, w.find_by_name("Lab_Main").unwrap()));

        let miss = w.cast_down(Vec3::new(10.0, 2.3, 0.0), 3.0).unwrap();
        assert_ne!(miss.entity, desk);
    }

    #[test]
    fn lights_follow_bound_switch() {
        let mut w = World::new();
        let sw = w
            .spawn(Entity::new("switch_02").with_switch(Switch::off().binding("lamp_02")), None)
            .unwrap();
        assert!(!w.is_lit("lamp_02"));
        w.switch_mut(sw).unwrap().set_on(true).unwrap();
        assert!(w.is_lit("LAMP_02"));
    }

    #[test]
    fn shared_world_clones_share_state() {
        let shared = SharedWorld::new(World::new());
        let other = shared.clone();
        shared.write().spawn(Entity::new("a"), None).unwrap();
        assert_eq!(other.read().len(), 1);
    }
}
