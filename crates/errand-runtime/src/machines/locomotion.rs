//! `move` – drive the base next to a named entity.

use errand_types::{ErrandError, RobotState, UpdateRecord};
use errand_world::{Aabb, Vec3, WorldRegistry};
use tokio::time::Instant;
use tracing::{debug, info};

use super::{MachineContext, ROBOT_SUBJECT};
use crate::completion::{StateMachine, StepStatus};

pub struct LocomotionMachine<'a> {
    ctx: &'a MachineContext,
}

pub struct MoveHandle {
    target: String,
    destination: Vec3,
    /// State to return to once the move ends.
    resume: RobotState,
    settle_until: Option<Instant>,
}

impl<'a> LocomotionMachine<'a> {
    pub fn new(ctx: &'a MachineContext) -> Self {
        Self { ctx }
    }

    /// Where to stop for `target`: the point of its bounds nearest the
    /// robot, at the robot's height, pulled back by `stand_back`.  Targets
    /// without geometry are approached at their pivot.
    pub fn approach_point(robot: Vec3, bounds: Option<Aabb>, pivot: Vec3, stand_back: f32) -> Vec3 {
        let Some(bounds) = bounds else {
            return Vec3::new(pivot.x, robot.y, pivot.z);
        };
        let mut closest = bounds.closest_point(robot);
        closest.y = robot.y;
        match (robot - closest).flattened().normalized() {
            Some(back) => closest + back * stand_back,
            // Already inside the footprint.
            None => closest,
        }
    }

    fn finish(&self, handle: &MoveHandle) -> StepStatus {
        let position = self.ctx.locomotion.position();
        self.ctx.state.set(handle.resume);
        self.ctx
            .aggregator
            .record(UpdateRecord::moved(ROBOT_SUBJECT, position.to_array()));
        info!(entity = %handle.target, x = position.x, z = position.z, "arrived");
        StepStatus::Done(format!("arrived at {}", handle.target))
    }

    fn arrived(&self, destination: Vec3) -> bool {
        let loco = &self.ctx.locomotion;
        let cfg = &self.ctx.config;
        if loco.arrived(cfg.arrive_tolerance, cfg.residual_speed) {
            return true;
        }
        // The agent's own estimate can disagree near cluttered goals; accept
        // coming to rest close enough.
        let speed = loco.speed();
        let at_rest = !loco.has_path() || speed * speed < cfg.residual_speed;
        at_rest && loco.position().horizontal_distance(destination) <= cfg.arrive_threshold
    }
}

impl StateMachine for LocomotionMachine<'_> {
    type Handle = MoveHandle;

    fn name(&self) -> &'static str {
        "move"
    }

    fn start(&self, argument: &str) -> Result<MoveHandle, ErrandError> {
        let target = self.ctx.resolve(argument)?;
        let robot = self.ctx.locomotion.position();
        let (bounds, pivot) = {
            let world = self.ctx.world.read();
            let pivot = world
                .pose_of(target)
                .ok_or_else(|| ErrandError::TargetNotFound(argument.to_string()))?
                .position;
            (world.bounds_of(target), pivot)
        };
        let destination = Self::approach_point(robot, bounds, pivot, self.ctx.config.stand_back);

        let (resume, moving) = match self.ctx.state.get() {
            RobotState::Idle => (RobotState::Idle, RobotState::Moving),
            RobotState::Picking => (RobotState::Picking, RobotState::MovingWhileHolding),
            other => {
                return Err(ErrandError::ActuatorRejected(format!(
                    "cannot move while {other}"
                )));
            }
        };
        self.ctx.state.transition(resume, moving)?;
        let issued = if moving == RobotState::MovingWhileHolding {
            self.ctx.locomotion.move_while_holding(destination)
        } else {
            self.ctx.locomotion.move_to(destination)
        };
        if let Err(e) = issued {
            self.ctx.state.set(resume);
            return Err(e);
        }
        debug!(entity = argument, x = destination.x, z = destination.z, "move issued");
        Ok(MoveHandle {
            target: self.ctx.name_of(target),
            destination,
            resume,
            settle_until: None,
        })
    }

    fn poll(&self, handle: &mut MoveHandle) -> StepStatus {
        if let Some(until) = handle.settle_until {
            return if Instant::now() >= until {
                self.finish(handle)
            } else {
                StepStatus::Pending
            };
        }
        if self.ctx.locomotion.path_pending() || !self.arrived(handle.destination) {
            return StepStatus::Pending;
        }
        let settle = self.ctx.config.move_settle();
        if settle.is_zero() {
            return self.finish(handle);
        }
        handle.settle_until = Some(Instant::now() + settle);
        StepStatus::Pending
    }

    fn abort(&self, handle: &mut MoveHandle) {
        self.ctx.locomotion.stop();
        self.ctx.state.set(handle.resume);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{Completion, await_completion};
    use crate::machines::testing::fixture;
    use errand_hal::{Locomotion, SimRobotConfig};
    use std::time::Duration;

    #[test]
    fn approach_stops_short_of_bounds() {
        let desk = Aabb::new(Vec3::new(2.0, 0.0, -0.5), Vec3::new(4.0, 0.8, 0.5));
        let p = LocomotionMachine::approach_point(Vec3::zero(), Some(desk), Vec3::new(3.0, 0.0, 0.0), 0.6);
        assert!((p.x - 1.4).abs() < 1e-5, "{p:?}");
        assert_eq!(p.y, 0.0);
        assert_eq!(p.z, 0.0);
    }

    #[test]
    fn approach_without_bounds_uses_pivot() {
        let pivot = Vec3::new(5.0, 2.0, -1.0);
        let p = LocomotionMachine::approach_point(Vec3::new(0.0, 0.1, 0.0), None, pivot, 0.6);
        assert_eq!(p, Vec3::new(5.0, 0.1, -1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_target_fails_before_moving() {
        let f = fixture(SimRobotConfig::default());
        let machine = LocomotionMachine::new(&f.ctx);
        let err = machine.start("unknown_object").err().unwrap();
        assert!(matches!(err, ErrandError::TargetNotFound(_)));
        assert_eq!(f.ctx.state.get(), RobotState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn move_arrives_settles_and_records() {
        let f = fixture(SimRobotConfig::default());
        let machine = LocomotionMachine::new(&f.ctx);
        let mut handle = machine.start("desk_01").unwrap();
        assert_eq!(f.ctx.state.get(), RobotState::Moving);

        let done = await_completion(&machine, &mut handle, Duration::from_secs(15), Duration::from_millis(20)).await;
        assert_eq!(done, Completion::Success("arrived at desk_01".into()));
        assert_eq!(f.ctx.state.get(), RobotState::Idle);
        assert!((f.robot.position().x - 1.4).abs() < 1e-3);
        assert_eq!(f.sink.texts(), vec!["move:robot pos=(1.40,0.00,0.00)"]);
    }

    #[tokio::test(start_paused = true)]
    async fn move_times_out_and_stops() {
        let f = fixture(SimRobotConfig {
            speed: 0.5,
            ..SimRobotConfig::default()
        });
        let machine = LocomotionMachine::new(&f.ctx);
        let mut handle = machine.start("door_03").unwrap();
        let done = await_completion(&machine, &mut handle, Duration::from_secs(2), Duration::from_millis(20)).await;
        assert!(matches!(done, Completion::Timeout(ErrandError::Timeout { .. })));
        assert_eq!(f.ctx.state.get(), RobotState::Idle);
        assert!(!f.robot.has_path());
        assert!(f.sink.texts().is_empty());
    }

    #[test]
    fn move_is_rejected_mid_place() {
        let f = fixture(SimRobotConfig::default());
        f.ctx.state.set(RobotState::Placing);
        let err = LocomotionMachine::new(&f.ctx).start("desk_01").err().unwrap();
        assert!(matches!(err, ErrandError::ActuatorRejected(_)));
    }
}
