//! [`SimRobot`] – an in-process mobile manipulator for demos and tests.
//!
//! Implements both [`Locomotion`] and [`Manipulator`] against a
//! [`SharedWorld`].  Nothing runs in the background while the robot drives:
//! its position is a pure function of the tokio clock and is written back to
//! the world whenever a predicate is queried.  Attach and place are spawned
//! as tokio tasks that sleep for the rotation time plus a fixed delay, then
//! mutate the world and publish the edge event on
//! [`Topic::Manipulation`].
//!
//! Because all timing goes through [`tokio::time`], tests running with a
//! paused clock are deterministic.
//!
//! # Fault injection
//!
//! | Flag | Effect |
//! |---|---|
//! | `stall_attach` | Pick never attaches and no `Attached` edge is sent. |
//! | `stall_place` | Place never completes and no `Placed` edge is sent. |
//! | `drop_before_place` | The object slips out of the gripper just before release; `PlaceAborted` is sent instead of `Placed`. |

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use errand_middleware::{EventBus, Topic};
use errand_types::{ErrandError, EventPayload};
use errand_world::{EntityId, Pose, SharedWorld, Vec3, WorldRegistry, yaw_delta, yaw_towards};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::locomotion::Locomotion;
use crate::manipulator::Manipulator;

const SOURCE: &str = "errand-hal::sim";

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimRobotConfig {
    /// Cruise speed, m/s.
    pub speed: f32,
    /// Braking distance reported to the arrival predicate, metres.
    pub stopping_distance: f32,
    /// Time the path planner takes before the base starts moving.
    pub path_planning_ms: u64,
    /// Turn rate while facing a pick or place target.
    pub rotate_speed_deg: f32,
    /// Headings closer than this need no turn.
    pub facing_threshold_deg: f32,
    /// Time from facing the object to the gripper closing.
    pub attach_delay_ms: u64,
    /// Time from facing the surface to the gripper opening.
    pub place_detach_delay_ms: u64,
    /// Height of the gripper above the base origin, metres.
    pub grip_height: f32,
    /// Reach of the gripper in front of the base, metres.
    pub grip_reach: f32,
    /// Never close the gripper (pick deadline test).
    pub stall_attach: bool,
    /// Never open the gripper (place deadline test).
    pub stall_place: bool,
    /// Lose the held object just before release.
    pub drop_before_place: bool,
}

impl Default for SimRobotConfig {
    fn default() -> Self {
        Self {
            speed: 1.5,
            stopping_distance: 0.3,
            path_planning_ms: 100,
            rotate_speed_deg: 360.0,
            facing_threshold_deg: 5.0,
            attach_delay_ms: 2200,
            place_detach_delay_ms: 2170,
            grip_height: 1.0,
            grip_reach: 0.3,
            stall_attach: false,
            stall_place: false,
            drop_before_place: false,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Internal state
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Motion {
    from: Vec3,
    to: Vec3,
    /// When the planner hands over the path and driving begins.
    ready_at: Instant,
}

impl Motion {
    fn total(&self) -> f32 {
        self.from.distance(self.to)
    }

    fn travelled(&self, now: Instant, speed: f32) -> f32 {
        if now < self.ready_at {
            return 0.0;
        }
        (now - self.ready_at).as_secs_f32() * speed
    }
}

#[derive(Debug, Default)]
struct SimState {
    motion: Option<Motion>,
    held: Option<EntityId>,
    /// Bumped by `cancel_pending`; in-flight tasks compare against it.
    generation: u64,
}

struct Inner {
    id: String,
    body: EntityId,
    world: SharedWorld,
    bus: EventBus,
    config: SimRobotConfig,
    state: Mutex<SimState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn body_pose(&self) -> Pose {
        self.world.read().pose_of(self.body).unwrap_or_default()
    }

    fn grip_pose(&self, body: Pose) -> Pose {
        let local = Vec3::new(0.0, self.config.grip_height, self.config.grip_reach);
        Pose::new(body.transform_point(local), body.yaw)
    }

    /// Bring the world in line with the clock: move the body (and whatever
    /// it carries) along the current path and retire finished paths.
    fn advance(&self, state: &mut SimState) {
        let Some(motion) = state.motion else {
            return;
        };
        let total = motion.total();
        let travelled = motion.travelled(Instant::now(), self.config.speed);
        let t = if total <= f32::EPSILON {
            1.0
        } else {
            (travelled / total).min(1.0)
        };
        let position = motion.from.lerp(motion.to, t);
        let mut pose = self.body_pose();
        pose.position = position;
        if let Some(yaw) = yaw_towards(motion.from, motion.to) {
            pose.yaw = yaw;
        }

        let mut world = self.world.write();
        // The body always exists; it was validated at construction.
        let _ = world.set_pose(self.body, pose);
        if let Some(held) = state.held {
            let _ = world.set_pose(held, self.grip_pose(pose));
        }
        drop(world);

        if t >= 1.0 {
            debug!(robot = %self.id, x = position.x, z = position.z, "path complete");
            state.motion = None;
        }
    }

    /// Time needed to turn the body towards `target`, applying the new
    /// heading to the world immediately.
    fn face(&self, target: Vec3) -> Duration {
        let mut pose = self.body_pose();
        let Some(yaw) = yaw_towards(pose.position, target) else {
            return Duration::ZERO;
        };
        let delta = yaw_delta(pose.yaw, yaw).to_degrees();
        pose.yaw = yaw;
        let _ = self.world.write().set_pose(self.body, pose);
        if delta <= self.config.facing_threshold_deg || self.config.rotate_speed_deg <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f32(delta / self.config.rotate_speed_deg)
        }
    }

    fn name_of(&self, id: EntityId) -> String {
        self.world
            .read()
            .name_of(id)
            .map(str::to_string)
            .unwrap_or_else(|| id.to_string())
    }

    fn finish_attach(&self, target: EntityId, generation: u64) {
        let mut state = self.lock();
        if state.generation != generation {
            debug!(robot = %self.id, "attach cancelled");
            return;
        }
        if self.config.stall_attach {
            warn!(robot = %self.id, "attach stalled (fault injection)");
            return;
        }
        let grip = self.grip_pose(self.body_pose());
        if let Err(e) = self.world.write().attach(target, self.body, grip) {
            warn!(robot = %self.id, error = %e, "attach failed");
            return;
        }
        state.held = Some(target);
        drop(state);

        let object = self.name_of(target);
        info!(robot = %self.id, object = %object, "attached");
        self.bus
            .emit(Topic::Manipulation, SOURCE, EventPayload::Attached { object });
    }

    fn finish_place(&self, object: EntityId, surface: EntityId, pose: Pose, generation: u64) {
        let mut state = self.lock();
        if state.generation != generation {
            debug!(robot = %self.id, "place cancelled");
            return;
        }
        if self.config.stall_place {
            warn!(robot = %self.id, "place stalled (fault injection)");
            return;
        }
        let name = self.name_of(object);
        if self.config.drop_before_place || state.held != Some(object) {
            state.held = None;
            let mut world = self.world.write();
            let _ = world.reparent(object, None);
            let _ = world.set_physics(object, true);
            drop(world);
            drop(state);
            warn!(robot = %self.id, object = %name, "object lost before release");
            self.bus.emit(
                Topic::Manipulation,
                SOURCE,
                EventPayload::PlaceAborted { object: name },
            );
            return;
        }
        if let Err(e) = self.world.write().place_entity(object, pose, surface) {
            warn!(robot = %self.id, error = %e, "place failed");
            return;
        }
        state.held = None;
        drop(state);

        let surface = self.name_of(surface);
        info!(robot = %self.id, object = %name, surface = %surface, "placed");
        self.bus.emit(
            Topic::Manipulation,
            SOURCE,
            EventPayload::Placed {
                object: name,
                surface,
            },
        );
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimRobot
// ────────────────────────────────────────────────────────────────────────────

/// Simulated base + arm.  Clone it cheaply; clones drive the same robot.
#[derive(Clone)]
pub struct SimRobot {
    inner: Arc<Inner>,
}

impl SimRobot {
    /// Wrap the world entity `body` as a robot.
    ///
    /// # Errors
    ///
    /// Returns [`ErrandError::TargetNotFound`] when `body` is not in `world`.
    pub fn new(
        id: impl Into<String>,
        body: EntityId,
        world: SharedWorld,
        bus: EventBus,
        config: SimRobotConfig,
    ) -> Result<Self, ErrandError> {
        if world.read().pose_of(body).is_none() {
            return Err(ErrandError::TargetNotFound(body.to_string()));
        }
        Ok(Self {
            inner: Arc::new(Inner {
                id: id.into(),
                body,
                world,
                bus,
                config,
                state: Mutex::new(SimState::default()),
            }),
        })
    }

    /// The world entity this robot drives.
    pub fn body(&self) -> EntityId {
        self.inner.body
    }

    pub fn config(&self) -> &SimRobotConfig {
        &self.inner.config
    }

    fn start_motion(&self, destination: Vec3) -> Result<(), ErrandError> {
        let mut state = self.inner.lock();
        self.inner.advance(&mut state);
        let from = self.inner.body_pose().position;
        state.motion = Some(Motion {
            from,
            to: destination,
            ready_at: Instant::now() + Duration::from_millis(self.inner.config.path_planning_ms),
        });
        debug!(
            robot = %self.inner.id,
            x = destination.x,
            z = destination.z,
            carrying = state.held.is_some(),
            "goal accepted"
        );
        Ok(())
    }

    fn spawn<F>(&self, delay: Duration, job: F) -> Result<(), ErrandError>
    where
        F: FnOnce(&Inner) + Send + 'static,
    {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| ErrandError::ActuatorRejected(format!("no async runtime: {e}")))?;
        let inner = Arc::clone(&self.inner);
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            job(&inner);
        });
        Ok(())
    }
}

impl Locomotion for SimRobot {
    fn id(&self) -> &str {
        &self.inner.id
    }

    fn move_to(&self, destination: Vec3) -> Result<(), ErrandError> {
        self.start_motion(destination)
    }

    fn move_while_holding(&self, destination: Vec3) -> Result<(), ErrandError> {
        if self.inner.lock().held.is_none() {
            return Err(ErrandError::ActuatorRejected(
                "move_while_holding without a held object".into(),
            ));
        }
        self.start_motion(destination)
    }

    fn stop(&self) {
        let mut state = self.inner.lock();
        if let Some(mut motion) = state.motion {
            // Freeze at the current spot by retargeting there.
            let now = Instant::now();
            let total = motion.total();
            let t = if total <= f32::EPSILON {
                1.0
            } else {
                (motion.travelled(now, self.inner.config.speed) / total).min(1.0)
            };
            motion.to = motion.from.lerp(motion.to, t);
            motion.ready_at = now;
            motion.from = motion.to;
            state.motion = Some(motion);
            self.inner.advance(&mut state);
        }
    }

    fn path_pending(&self) -> bool {
        let state = self.inner.lock();
        state.motion.is_some_and(|m| Instant::now() < m.ready_at)
    }

    fn has_path(&self) -> bool {
        let mut state = self.inner.lock();
        self.inner.advance(&mut state);
        state.motion.is_some()
    }

    fn remaining_distance(&self) -> f32 {
        let mut state = self.inner.lock();
        self.inner.advance(&mut state);
        match state.motion {
            Some(m) => (m.total() - m.travelled(Instant::now(), self.inner.config.speed)).max(0.0),
            None => 0.0,
        }
    }

    fn stopping_distance(&self) -> f32 {
        self.inner.config.stopping_distance
    }

    fn speed(&self) -> f32 {
        let mut state = self.inner.lock();
        self.inner.advance(&mut state);
        match state.motion {
            Some(m) if Instant::now() >= m.ready_at => self.inner.config.speed,
            _ => 0.0,
        }
    }

    fn position(&self) -> Vec3 {
        let mut state = self.inner.lock();
        self.inner.advance(&mut state);
        drop(state);
        self.inner.body_pose().position
    }
}

impl Manipulator for SimRobot {
    fn id(&self) -> &str {
        &self.inner.id
    }

    fn pick(&self, target: EntityId) -> Result<(), ErrandError> {
        let generation = {
            let mut state = self.inner.lock();
            if let Some(held) = state.held {
                return Err(ErrandError::PreconditionViolation(format!(
                    "already holding {}",
                    self.inner.name_of(held)
                )));
            }
            self.inner.advance(&mut state);
            state.generation
        };
        if target == self.inner.body {
            return Err(ErrandError::PreconditionViolation("robot cannot pick itself".into()));
        }
        let target_pos = self
            .inner
            .world
            .read()
            .pose_of(target)
            .ok_or_else(|| ErrandError::TargetNotFound(target.to_string()))?
            .position;

        let turn = self.inner.face(target_pos);
        let delay = turn + Duration::from_millis(self.inner.config.attach_delay_ms);
        debug!(robot = %self.inner.id, ?delay, "pick started");
        self.spawn(delay, move |inner| inner.finish_attach(target, generation))
    }

    fn place_on(&self, surface: EntityId, pose: Pose) -> bool {
        let (object, generation) = {
            let mut state = self.inner.lock();
            self.inner.advance(&mut state);
            match state.held {
                Some(object) => (object, state.generation),
                None => return false,
            }
        };
        let Some(surface_pos) = self.inner.world.read().pose_of(surface).map(|p| p.position) else {
            return false;
        };
        let turn = self.inner.face(surface_pos);
        let delay = turn + Duration::from_millis(self.inner.config.place_detach_delay_ms);
        debug!(robot = %self.inner.id, ?delay, "place started");
        self.spawn(delay, move |inner| {
            inner.finish_place(object, surface, pose, generation)
        })
        .is_ok()
    }

    fn is_holding(&self) -> bool {
        self.inner.lock().held.is_some()
    }

    fn held(&self) -> Option<EntityId> {
        self.inner.lock().held
    }

    fn cancel_pending(&self) {
        let mut state = self.inner.lock();
        state.generation += 1;
        debug!(robot = %self.inner.id, generation = state.generation, "pending manipulation cancelled");
    }
}
