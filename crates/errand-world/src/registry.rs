//! Collaborator interfaces the execution engine queries the world through.
//!
//! [`WorldRegistry`] is the name → entity lookup with bounds and capability
//! queries.  [`SurfaceProbe`] is the downward ray used by the placement
//! solver to find the true height of a surface.  [`World`][crate::World]
//! implements both.

use std::collections::HashSet;

use errand_types::Capability;

use crate::devices::{DoorController, SwitchController};
use crate::entity::EntityId;
use crate::geometry::{Aabb, Pose, Vec3};

/// Name-keyed entity registry.
pub trait WorldRegistry: Send + Sync {
    /// Exact-name lookup.
    fn find_by_name(&self, name: &str) -> Option<EntityId>;

    /// Case-insensitive scan over every entity carrying `capability`.
    ///
    /// This is a linear fallback for operator input that does not match an
    /// entity name exactly.
    fn find_ignore_case(&self, name: &str, capability: Capability) -> Option<EntityId>;

    fn name_of(&self, id: EntityId) -> Option<&str>;

    fn pose_of(&self, id: EntityId) -> Option<Pose>;

    /// World-space bounds of `id` aggregated over every renderable and
    /// collidable part it or any descendant owns.  `None` when there is no
    /// geometry at all.
    fn bounds_of(&self, id: EntityId) -> Option<Aabb>;

    fn capabilities_of(&self, id: EntityId) -> HashSet<Capability>;

    /// `id` itself or the first descendant (breadth-first) carrying
    /// `capability`.
    fn find_capable(&self, id: EntityId, capability: Capability) -> Option<EntityId>;

    fn door_mut(&mut self, id: EntityId) -> Option<&mut dyn DoorController>;

    fn switch_mut(&mut self, id: EntityId) -> Option<&mut dyn SwitchController>;
}

/// Result of a downward surface probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeHit {
    pub point: Vec3,
    pub entity: EntityId,
}

/// Downward ray queries against physical geometry.
pub trait SurfaceProbe {
    /// Cast a ray straight down from `origin` for at most `max_distance`.
    /// Returns the first collidable surface hit.
    fn cast_down(&self, origin: Vec3, max_distance: f32) -> Option<ProbeHit>;

    /// True when `id` is `ancestor` or lies below it in the hierarchy.
    fn is_descendant_of(&self, id: EntityId, ancestor: EntityId) -> bool;
}
