//! World entities.
//!
//! An [`Entity`] is a named node in the scene hierarchy.  Its geometry is a
//! list of [`Part`]s expressed in the entity's local frame; the world-space
//! bounds of an entity are the union of its own parts and those of every
//! descendant (see [`World::bounds_of`][crate::World]).

use std::fmt;

use errand_types::Capability;

use crate::devices::{Door, Switch};
use crate::geometry::{Aabb, Pose, Vec3};

/// Index of an entity inside a [`World`][crate::World].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub(crate) usize);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    /// Visible geometry.  Contributes to bounds only.
    Renderable,
    /// Physical geometry.  Contributes to bounds and is hit by surface probes
    /// while the entity's physics is enabled.
    Collidable,
}

/// One geometric sub-part, boxed in the owning entity's local frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Part {
    pub kind: PartKind,
    pub local: Aabb,
}

/// A named node in the scene.
#[derive(Debug, Clone)]
pub struct Entity {
    pub(crate) name: String,
    pub(crate) pose: Pose,
    pub(crate) parent: Option<EntityId>,
    pub(crate) children: Vec<EntityId>,
    pub(crate) parts: Vec<Part>,
    pub(crate) door: Option<Door>,
    pub(crate) switch: Option<Switch>,
    pub(crate) surface: bool,
    pub(crate) physics: bool,
}

impl Entity {
    /// A bare entity at the origin with no geometry and physics enabled.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pose: Pose::default(),
            parent: None,
            children: Vec::new(),
            parts: Vec::new(),
            door: None,
            switch: None,
            surface: false,
            physics: true,
        }
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.pose.position = position;
        self
    }

    pub fn with_yaw(mut self, yaw: f32) -> Self {
        self.pose.yaw = yaw;
        self
    }

    /// Add a collidable box centred at `offset` (local frame) with half-sizes
    /// `extents`.
    pub fn with_collider(self, offset: Vec3, extents: Vec3) -> Self {
        self.with_part(PartKind::Collidable, Aabb::from_center_extents(offset, extents))
    }

    /// Add a renderable-only box.
    pub fn with_renderer(self, offset: Vec3, extents: Vec3) -> Self {
        self.with_part(PartKind::Renderable, Aabb::from_center_extents(offset, extents))
    }

    pub fn with_part(mut self, kind: PartKind, local: Aabb) -> Self {
        self.parts.push(Part { kind, local });
        self
    }

    pub fn with_door(mut self, door: Door) -> Self {
        self.door = Some(door);
        self
    }

    pub fn with_switch(mut self, switch: Switch) -> Self {
        self.switch = Some(switch);
        self
    }

    /// Mark the entity as something objects can be placed on.
    pub fn surface(mut self) -> Self {
        self.surface = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    pub fn physics_enabled(&self) -> bool {
        self.physics
    }

    pub fn door(&self) -> Option<&Door> {
        self.door.as_ref()
    }

    pub fn switch(&self) -> Option<&Switch> {
        self.switch.as_ref()
    }

    /// Capabilities carried by this entity itself (not its descendants).
    pub fn own_capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        [
            self.door.as_ref().map(|_| Capability::Door),
            self.switch.as_ref().map(|_| Capability::Switch),
            self.surface.then_some(Capability::Surface),
        ]
        .into_iter()
        .flatten()
    }

    /// World-space boxes of this entity's own parts.
    pub(crate) fn world_parts(&self) -> impl Iterator<Item = (PartKind, Aabb)> + '_ {
        self.parts
            .iter()
            .map(|p| (p.kind, p.local.transformed(&self.pose)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_capabilities() {
        let e = Entity::new("desk_01").surface().with_door(Door::closed());
        let caps: Vec<Capability> = e.own_capabilities().collect();
        assert_eq!(caps, vec![Capability::Door, Capability::Surface]);
    }

    #[test]
    fn world_parts_follow_pose() {
        let e = Entity::new("box")
            .at(Vec3::new(2.0, 0.0, 0.0))
            .with_collider(Vec3::new(0.0, 0.5, 0.0), Vec3::new(0.5, 0.5, 0.5));
        let (kind, b) = e.world_parts().next().unwrap();
        assert_eq!(kind, PartKind::Collidable);
        assert!((b.min.x - 1.5).abs() < 1e-5);
        assert!((b.max.y - 1.0).abs() < 1e-5);
    }
}
