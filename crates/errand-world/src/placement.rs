//! Placement solver for the `place` action.
//!
//! Given the held object's bounds and the target surface's bounds and pose,
//! [`PlacementSolver::solve`] picks a spot on the target's top face on the
//! side nearest the robot:
//!
//! 1. Project the robot's offset from the target centre onto the target's
//!    right/forward axes.  The sideways component is kept (clamped), the
//!    front/back component only selects which edge to use.
//! 2. Clamp so the held footprint, inflated by `margin`, stays inside the top
//!    face.  When the object is wider than the surface it is centred.
//! 3. Optionally probe straight down from `probe_height` above the candidate
//!    and take the hit height, but only when the hit belongs to the target or
//!    one of its descendants.
//! 4. Rest the held object's bounds centre `margin` above that surface while
//!    keeping its pivot-to-bounds offset.
//! 5. Optionally align yaw with the target's forward axis.

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::geometry::{Aabb, Pose, Vec3};
use crate::registry::SurfaceProbe;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementConfig {
    /// Clearance kept from the surface edges and above the surface, metres.
    #[serde(default = "default_margin")]
    pub margin: f32,
    /// Turn the placed object to the target's heading.
    #[serde(default = "default_align_yaw")]
    pub align_yaw_to_target: bool,
    /// Height above the top face the surface probe starts from, metres.
    #[serde(default = "default_probe_height")]
    pub probe_height: f32,
}

fn default_margin() -> f32 {
    0.02
}
fn default_align_yaw() -> bool {
    true
}
fn default_probe_height() -> f32 {
    1.5
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            margin: default_margin(),
            align_yaw_to_target: default_align_yaw(),
            probe_height: default_probe_height(),
        }
    }
}

/// Everything the solver needs to know about one placement.
#[derive(Debug, Clone, Copy)]
pub struct PlacementRequest {
    /// World bounds of the held object; `None` when it has no geometry.
    pub held_bounds: Option<Aabb>,
    /// Current pivot position and heading of the held object.
    pub held_pose: Pose,
    pub target: EntityId,
    /// World bounds of the target; `None` when it has no geometry.
    pub target_bounds: Option<Aabb>,
    pub target_pose: Pose,
    pub robot_position: Vec3,
}

#[derive(Debug, Clone, Default)]
pub struct PlacementSolver {
    config: PlacementConfig,
}

impl PlacementSolver {
    pub fn new(config: PlacementConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    /// Compute the final pose of the held object's pivot.
    ///
    /// Returns `None` when either bounds is missing.
    pub fn solve(&self, req: &PlacementRequest, probe: Option<&dyn SurfaceProbe>) -> Option<Pose> {
        let held = req.held_bounds?;
        let target = req.target_bounds?;
        let margin = self.config.margin;

        let right = req.target_pose.right();
        let forward = req.target_pose.forward();

        let half_width = target.half_along(right);
        let half_depth = target.half_along(forward);
        let held_half_up = held.half_along(Vec3::UP);

        let inset_x = held.half_along(right) + margin;
        let inset_z = held.half_along(forward) + margin;

        let to_robot = req.robot_position - target.center();
        let side = to_robot.dot(right);
        let front = to_robot.dot(forward);

        let x_local = clamp_or_centre(side, half_width - inset_x);
        let z_reach = (half_depth - inset_z).max(0.0);
        let z_local = if front >= 0.0 { z_reach } else { -z_reach };

        let center = target.center();
        let top_xz = Vec3::new(center.x, target.max.y, center.z) + right * x_local + forward * z_local;

        let mut surface_y = target.max.y;
        if let Some(probe) = probe {
            let origin = top_xz + Vec3::UP * self.config.probe_height;
            if let Some(hit) = probe.cast_down(origin, self.config.probe_height * 2.0)
                && probe.is_descendant_of(hit.entity, req.target)
            {
                surface_y = hit.point.y;
            }
        }

        let pivot_to_bounds = held.center() - req.held_pose.position;
        let desired_center = Vec3::new(top_xz.x, surface_y + held_half_up + margin, top_xz.z);
        let position = desired_center - pivot_to_bounds;

        let yaw = if self.config.align_yaw_to_target {
            req.target_pose.yaw
        } else {
            req.held_pose.yaw
        };
        Some(Pose::new(position, yaw))
    }
}

/// Clamp `value` to `[-reach, reach]`; a negative reach (object wider than
/// the surface) centres it.
fn clamp_or_centre(value: f32, reach: f32) -> f32 {
    if reach < 0.0 { 0.0 } else { value.clamp(-reach, reach) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::world::World;
    use crate::registry::WorldRegistry;
    use std::f32::consts::FRAC_PI_2;

    const EPS: f32 = 1e-4;

    fn desk_bounds() -> Aabb {
        // 2.0 m wide (x), 1.0 m deep (z), top at 0.8.
        Aabb::new(Vec3::new(2.0, 0.0, -0.5), Vec3::new(4.0, 0.8, 0.5))
    }

    fn laptop_at(pivot: Vec3) -> Aabb {
        Aabb::from_center_extents(pivot, Vec3::new(0.2, 0.02, 0.15))
    }

    fn request(robot: Vec3, target_yaw: f32) -> PlacementRequest {
        let pivot = Vec3::new(0.0, 1.0, 0.0);
        PlacementRequest {
            held_bounds: Some(laptop_at(pivot)),
            held_pose: Pose::new(pivot, 0.3),
            target: EntityId(0),
            target_bounds: Some(desk_bounds()),
            target_pose: Pose::new(Vec3::new(3.0, 0.0, 0.0), target_yaw),
            robot_position: robot,
        }
    }

    fn assert_footprint_inside(pose: &Pose, margin: f32) {
        let held = laptop_at(pose.position);
        let desk = desk_bounds();
        assert!(held.min.x >= desk.min.x + margin - EPS, "{held:?}");
        assert!(held.max.x <= desk.max.x - margin + EPS, "{held:?}");
        assert!(held.min.z >= desk.min.z + margin - EPS, "{held:?}");
        assert!(held.max.z <= desk.max.z - margin + EPS, "{held:?}");
    }

    #[test]
    fn footprint_stays_inside_inset_top_face() {
        let solver = PlacementSolver::default();
        for robot in [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(10.0, 0.0, -3.0),
            Vec3::new(3.0, 0.0, 5.0),
            Vec3::new(3.2, 0.0, -5.0),
        ] {
            let pose = solver.solve(&request(robot, 0.0), None).unwrap();
            assert_footprint_inside(&pose, 0.02);
        }
    }

    #[test]
    fn height_is_top_plus_half_height_plus_margin() {
        let solver = PlacementSolver::default();
        let pose = solver.solve(&request(Vec3::new(0.0, 0.0, 0.0), 0.0), None).unwrap();
        // Pivot coincides with the bounds centre in this fixture.
        assert!((pose.position.y - (0.8 + 0.02 + 0.02)).abs() < EPS);
    }

    #[test]
    fn picks_the_edge_facing_the_robot() {
        let solver = PlacementSolver::default();
        let front = solver.solve(&request(Vec3::new(3.0, 0.0, 4.0), 0.0), None).unwrap();
        let back = solver.solve(&request(Vec3::new(3.0, 0.0, -4.0), 0.0), None).unwrap();
        assert!(front.position.z > 0.0);
        assert!(back.position.z < 0.0);
        // Sideways offset is kept while it fits.
        let side = solver.solve(&request(Vec3::new(3.5, 0.0, 4.0), 0.0), None).unwrap();
        assert!((side.position.x - 3.5).abs() < EPS);
    }

    #[test]
    fn oversized_object_is_centred() {
        let solver = PlacementSolver::default();
        let mut req = request(Vec3::new(9.0, 0.0, 9.0), 0.0);
        req.held_bounds = Some(Aabb::from_center_extents(
            req.held_pose.position,
            Vec3::new(1.5, 0.1, 0.8),
        ));
        let pose = solver.solve(&req, None).unwrap();
        assert!((pose.position.x - 3.0).abs() < EPS);
        assert!(pose.position.z.abs() < EPS);
    }

    #[test]
    fn yaw_alignment_is_optional() {
        let aligned = PlacementSolver::default()
            .solve(&request(Vec3::zero(), FRAC_PI_2), None)
            .unwrap();
        assert!((aligned.yaw - FRAC_PI_2).abs() < EPS);

        let kept = PlacementSolver::new(PlacementConfig {
            align_yaw_to_target: false,
            ..PlacementConfig::default()
        })
        .solve(&request(Vec3::zero(), FRAC_PI_2), None)
        .unwrap();
        assert!((kept.yaw - 0.3).abs() < EPS);
    }

    #[test]
    fn pivot_offset_is_preserved() {
        let solver = PlacementSolver::default();
        let mut req = request(Vec3::zero(), 0.0);
        // Bounds centre sits 0.1 m above the pivot.
        req.held_bounds = Some(laptop_at(req.held_pose.position + Vec3::new(0.0, 0.1, 0.0)));
        let pose = solver.solve(&req, None).unwrap();
        assert!((pose.position.y - (0.8 + 0.02 + 0.02 - 0.1)).abs() < EPS);
    }

    #[test]
    fn missing_bounds_yield_no_solution() {
        let solver = PlacementSolver::default();
        let mut req = request(Vec3::zero(), 0.0);
        req.target_bounds = None;
        assert!(solver.solve(&req, None).is_none());
        let mut req = request(Vec3::zero(), 0.0);
        req.held_bounds = None;
        assert!(solver.solve(&req, None).is_none());
    }

    #[test]
    fn probe_only_trusted_on_target_descendants() {
        let mut world = World::new();
        let desk = world
            .spawn(
                Entity::new("desk_01")
                    .at(Vec3::new(3.0, 0.0, 0.0))
                    .with_renderer(Vec3::new(0.0, 0.4, 0.0), Vec3::new(1.0, 0.4, 0.5)),
                None,
            )
            .unwrap();
        // The physical top sits slightly below the visual bounds.
        world
            .spawn(
                Entity::new("desk_top")
                    .at(Vec3::new(3.0, 0.0, 0.0))
                    .with_collider(Vec3::new(0.0, 0.77, 0.0), Vec3::new(1.0, 0.01, 0.5)),
                Some(desk),
            )
            .unwrap();
        let solver = PlacementSolver::default();
        let mut req = request(Vec3::zero(), 0.0);
        req.target = desk;
        req.target_bounds = world.bounds_of(desk);
        let pose = solver.solve(&req, Some(&world)).unwrap();
        assert!((pose.position.y - (0.78 + 0.02 + 0.02)).abs() < EPS);

        // A hovering shelf that does not belong to the desk is ignored.
        world
            .spawn(
                Entity::new("shelf")
                    .at(Vec3::new(3.0, 0.0, 0.0))
                    .with_collider(Vec3::new(0.0, 1.5, 0.0), Vec3::new(2.0, 0.01, 2.0)),
                None,
            )
            .unwrap();
        let pose = solver.solve(&req, Some(&world)).unwrap();
        assert!((pose.position.y - (0.8 + 0.02 + 0.02)).abs() < EPS);
    }
}
