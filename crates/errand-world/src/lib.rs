//! `errand-world` – World model and placement geometry.
//!
//! The execution engine never scans a scene; it asks an injected
//! [`WorldRegistry`] for entities by name, their aggregated bounds, and their
//! capabilities.
//!
//! # Modules
//!
//! - [`geometry`] – [`Vec3`], [`Aabb`] and [`Pose`] in a Y-up world.
//! - [`entity`] – [`Entity`] nodes with renderable/collidable parts and
//!   door/switch/surface capabilities.
//! - [`devices`] – [`HasOpenState`] / [`HasOnState`] capability interfaces
//!   and the door and switch controllers.
//! - [`registry`] – the [`WorldRegistry`] and [`SurfaceProbe`] interfaces.
//! - [`world`] – [`World`], the arena-backed implementation, and
//!   [`SharedWorld`], its lock-guarded shared handle.
//! - [`placement`] – [`PlacementSolver`], the pure geometry behind `place`.

pub mod devices;
pub mod entity;
pub mod geometry;
pub mod placement;
pub mod registry;
pub mod world;

pub use devices::{Door, DoorController, HasOnState, HasOpenState, Switch, SwitchController};
pub use entity::{Entity, EntityId, Part, PartKind};
pub use geometry::{Aabb, Pose, Vec3, yaw_delta, yaw_towards};
pub use placement::{PlacementConfig, PlacementRequest, PlacementSolver};
pub use registry::{ProbeHit, SurfaceProbe, WorldRegistry};
pub use world::{OBJECT_CONTAINER, ROOM_ROOTS, SharedWorld, World};
