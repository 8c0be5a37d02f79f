//! [`SimSceneBuilder`] – assembles a [`World`] for simulation and tests.
//!
//! Every entity is spawned under a single room root (default `"lab"`) so that
//! placed objects are collected into the room's `object` container.
//!
//! # Example
//!
//! ```rust
//! use errand_hal::scene::SimSceneBuilder;
//! use errand_world::{Vec3, WorldRegistry};
//!
//! let scene = SimSceneBuilder::new()
//!     .with_surface("desk_01", Vec3::new(3.0, 0.0, 0.0), Vec3::new(1.0, 0.8, 0.5))
//!     .with_object("laptop", Vec3::new(3.0, 0.82, 0.0), Vec3::new(0.2, 0.02, 0.15))
//!     .build()
//!     .unwrap();
//!
//! assert!(scene.world.read().find_by_name("laptop").is_some());
//! ```

use errand_types::ErrandError;
use errand_world::{Door, Entity, EntityId, SharedWorld, Switch, Vec3, World};

/// Name given to the robot's own entity.
pub const ROBOT_NAME: &str = "robot";

/// A built scene: the shared world plus the robot's entity.
#[derive(Debug, Clone)]
pub struct SimScene {
    pub world: SharedWorld,
    pub robot: EntityId,
}

impl SimScene {
    /// The stock scene used by the CLI and the scenario tests.
    pub fn demo() -> Result<Self, ErrandError> {
        SimSceneBuilder::demo().build()
    }
}

/// Builder for a [`SimScene`].
///
/// Spawn errors are deferred: the first one is kept and returned from
/// [`build`](Self::build), so chains never need `?` per call.
pub struct SimSceneBuilder {
    world: World,
    room: Option<EntityId>,
    robot_at: Vec3,
    error: Option<ErrandError>,
}

impl Default for SimSceneBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SimSceneBuilder {
    /// Empty room named `"lab"` with a floor.
    pub fn new() -> Self {
        Self::with_room("lab")
    }

    pub fn with_room(name: &str) -> Self {
        let mut builder = Self {
            world: World::new(),
            room: None,
            robot_at: Vec3::zero(),
            error: None,
        };
        builder.room = builder.spawn(Entity::new(name), None);
        builder.spawn_in_room(
            Entity::new(format!("{name}_floor"))
                .with_collider(Vec3::new(0.0, -0.05, 0.0), Vec3::new(20.0, 0.05, 20.0)),
        );
        builder
    }

    /// Stock layout: a desk, a table with a laptop on it, a door and a lamp.
    pub fn demo() -> Self {
        Self::new()
            .with_surface("desk_01", Vec3::new(3.0, 0.0, 0.0), Vec3::new(1.0, 0.8, 0.5))
            .with_surface("table_02", Vec3::new(-3.0, 0.0, 2.0), Vec3::new(0.6, 0.75, 0.6))
            .with_object("laptop", Vec3::new(-3.0, 0.77, 2.0), Vec3::new(0.2, 0.02, 0.15))
            .with_door("door_03", Vec3::new(0.0, 0.0, 6.0), false)
            .with_lamp("lamp_02", Vec3::new(2.0, 0.0, -3.0))
    }

    pub fn with_robot_at(mut self, position: Vec3) -> Self {
        self.robot_at = position;
        self
    }

    /// A box-shaped surface whose pivot sits on the floor at `position`.
    /// `size` is (half width, height, half depth).
    pub fn with_surface(mut self, name: &str, position: Vec3, size: Vec3) -> Self {
        let half = Vec3::new(size.x, size.y * 0.5, size.z);
        self.spawn_in_room(
            Entity::new(name)
                .at(position)
                .with_collider(Vec3::new(0.0, half.y, 0.0), half)
                .surface(),
        );
        self
    }

    /// A loose object whose pivot is its centre; `extents` are half-sizes.
    pub fn with_object(mut self, name: &str, position: Vec3, extents: Vec3) -> Self {
        self.spawn_in_room(
            Entity::new(name)
                .at(position)
                .with_collider(Vec3::zero(), extents)
                .with_renderer(Vec3::zero(), extents),
        );
        self
    }

    /// A door frame with a `<name>_leaf` child that carries the controller.
    pub fn with_door(mut self, name: &str, position: Vec3, locked: bool) -> Self {
        let frame = self.spawn_in_room(
            Entity::new(name)
                .at(position)
                .with_renderer(Vec3::new(0.0, 1.05, 0.0), Vec3::new(0.55, 1.05, 0.05)),
        );
        if let Some(frame) = frame {
            let door = if locked { Door::locked() } else { Door::closed() };
            self.spawn(
                Entity::new(format!("{name}_leaf"))
                    .at(position)
                    .with_collider(Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.45, 1.0, 0.03))
                    .with_door(door),
                Some(frame),
            );
        }
        self
    }

    /// A lamp with a `<name>_switch` child bound to it.
    pub fn with_lamp(mut self, name: &str, position: Vec3) -> Self {
        let lamp = self.spawn_in_room(
            Entity::new(name)
                .at(position)
                .with_renderer(Vec3::new(0.0, 0.8, 0.0), Vec3::new(0.15, 0.8, 0.15)),
        );
        if let Some(lamp) = lamp {
            self.spawn(
                Entity::new(format!("{name}_switch"))
                    .at(position)
                    .with_switch(Switch::off().binding(name)),
                Some(lamp),
            );
        }
        self
    }

    /// Add an arbitrary entity under the room.
    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.spawn_in_room(entity);
        self
    }

    /// Consume the builder, spawning the robot last.
    pub fn build(mut self) -> Result<SimScene, ErrandError> {
        let robot = self.spawn_in_room(
            Entity::new(ROBOT_NAME)
                .at(self.robot_at)
                .with_collider(Vec3::new(0.0, 0.6, 0.0), Vec3::new(0.3, 0.6, 0.3)),
        );
        if let Some(err) = self.error {
            return Err(err);
        }
        let robot = robot.ok_or_else(|| ErrandError::TargetNotFound(ROBOT_NAME.into()))?;
        Ok(SimScene {
            world: SharedWorld::new(self.world),
            robot,
        })
    }

    fn spawn_in_room(&mut self, entity: Entity) -> Option<EntityId> {
        let room = self.room;
        self.spawn(entity, room)
    }

    fn spawn(&mut self, entity: Entity, parent: Option<EntityId>) -> Option<EntityId> {
        if self.error.is_some() {
            return None;
        }
        match self.world.spawn(entity, parent) {
            Ok(id) => Some(id),
            Err(e) => {
                self.error = Some(e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use errand_types::Capability;
    use errand_world::{SurfaceProbe, WorldRegistry};

    #[test]
    fn demo_scene_has_every_named_entity() {
        let scene = SimScene::demo().unwrap();
        let w = scene.world.read();
        for name in ["lab", "desk_01", "table_02", "laptop", "door_03", "lamp_02", ROBOT_NAME] {
            assert!(w.find_by_name(name).is_some(), "missing {name}");
        }
        assert_eq!(w.name_of(scene.robot), Some(ROBOT_NAME));
    }

    #[test]
    fn door_capability_lives_on_the_leaf() {
        let scene = SimScene::demo().unwrap();
        let w = scene.world.read();
        let frame = w.find_by_name("door_03").unwrap();
        assert!(!w.capabilities_of(frame).contains(&Capability::Door));
        let leaf = w.find_capable(frame, Capability::Door).unwrap();
        assert_eq!(w.name_of(leaf), Some("door_03_leaf"));
    }

    #[test]
    fn lamp_switch_is_bound_and_off() {
        let scene = SimScene::demo().unwrap();
        let w = scene.world.read();
        let lamp = w.find_by_name("lamp_02").unwrap();
        assert!(w.find_capable(lamp, Capability::Switch).is_some());
        assert!(!w.is_lit("lamp_02"));
    }

    #[test]
    fn laptop_rests_on_table() {
        let scene = SimScene::demo().unwrap();
        let w = scene.world.read();
        let hit = w.cast_down(Vec3::new(-3.0, 2.0, 2.0), 3.0).unwrap();
        assert_eq!(w.name_of(hit.entity), Some("laptop"));
        assert!((hit.point.y - 0.79).abs() < 1e-5);
        let beside = w.cast_down(Vec3::new(-3.4, 2.0, 2.0), 3.0).unwrap();
        assert_eq!(w.name_of(beside.entity), Some("table_02"));
        assert!((beside.point.y - 0.75).abs() < 1e-5);
    }

    #[test]
    fn duplicate_names_surface_from_build() {
        let err = SimSceneBuilder::new()
            .with_object("cup", Vec3::zero(), Vec3::new(0.05, 0.05, 0.05))
            .with_object("cup", Vec3::zero(), Vec3::new(0.05, 0.05, 0.05))
            .build()
            .unwrap_err();
        assert!(matches!(err, ErrandError::PreconditionViolation(_)));
    }
}
