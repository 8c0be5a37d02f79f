//! `open` – open a door, then wait out a short settle delay.

use errand_types::{Capability, ErrandError, UpdateRecord};
use errand_world::{HasOpenState, WorldRegistry};
use tokio::time::Instant;
use tracing::info;

use super::MachineContext;
use crate::completion::{StateMachine, StepStatus};

pub struct DoorMachine<'a> {
    ctx: &'a MachineContext,
}

pub struct DoorHandle {
    door: String,
    settle_until: Instant,
}

impl<'a> DoorMachine<'a> {
    pub fn new(ctx: &'a MachineContext) -> Self {
        Self { ctx }
    }
}

impl StateMachine for DoorMachine<'_> {
    type Handle = DoorHandle;

    fn name(&self) -> &'static str {
        "open"
    }

    fn start(&self, argument: &str) -> Result<DoorHandle, ErrandError> {
        let target = self.ctx.resolve(argument)?;
        let open = {
            let mut world = self.ctx.world.write();
            let leaf = world
                .find_capable(target, Capability::Door)
                .ok_or_else(|| ErrandError::CapabilityMissing {
                    entity: argument.to_string(),
                    capability: Capability::Door,
                })?;
            let door = world.door_mut(leaf).ok_or_else(|| ErrandError::CapabilityMissing {
                entity: argument.to_string(),
                capability: Capability::Door,
            })?;
            door.open()?;
            door.is_open().unwrap_or(true)
        };
        self.ctx.aggregator.record(UpdateRecord::opened(argument, open));
        info!(door = argument, "door opened");
        Ok(DoorHandle {
            door: argument.to_string(),
            settle_until: Instant::now() + self.ctx.config.door_settle(),
        })
    }

    fn poll(&self, handle: &mut DoorHandle) -> StepStatus {
        if Instant::now() >= handle.settle_until {
            StepStatus::Done(format!("{} open", handle.door))
        } else {
            StepStatus::Pending
        }
    }

    fn abort(&self, _handle: &mut DoorHandle) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{Completion, await_completion};
    use crate::machines::testing::fixture;
    use errand_hal::SimRobotConfig;
    use errand_types::RobotState;
    use errand_world::{Door, Entity, Vec3};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn open_finds_leaf_and_settles() {
        let f = fixture(SimRobotConfig::default());
        let machine = DoorMachine::new(&f.ctx);
        let started = Instant::now();
        let mut handle = machine.start("door_03").unwrap();
        let done = await_completion(&machine, &mut handle, Duration::from_secs(15), Duration::from_millis(20)).await;
        assert_eq!(done, Completion::Success("door_03 open".into()));
        assert!(started.elapsed() >= Duration::from_millis(250));
        assert_eq!(f.sink.texts(), vec!["open:door_03 state=OPEN"]);
        assert_eq!(f.ctx.aggregator.door_state("DOOR_03"), Some(true));
        assert_eq!(f.ctx.state.get(), RobotState::Idle);

        let world = f.ctx.world.read();
        let leaf = world.find_by_name("door_03_leaf").unwrap();
        assert_eq!(world.entity(leaf).unwrap().door().unwrap().is_open(), Some(true));
    }

    #[test]
    fn open_on_non_door_is_capability_missing() {
        let f = fixture(SimRobotConfig::default());
        let err = DoorMachine::new(&f.ctx).start("desk_01").err().unwrap();
        assert!(matches!(
            err,
            ErrandError::CapabilityMissing { capability: Capability::Door, .. }
        ));
    }

    #[test]
    fn locked_door_is_rejected() {
        let f = fixture(SimRobotConfig::default());
        f.ctx
            .world
            .write()
            .spawn(Entity::new("vault").at(Vec3::new(9.0, 0.0, 0.0)).with_door(Door::locked()), None)
            .unwrap();
        let err = DoorMachine::new(&f.ctx).start("vault").err().unwrap();
        assert!(matches!(err, ErrandError::ActuatorRejected(_)));
        assert!(f.sink.texts().is_empty());
    }

    #[test]
    fn open_missing_door_is_target_not_found() {
        let f = fixture(SimRobotConfig::default());
        let err = DoorMachine::new(&f.ctx).start("door_99").err().unwrap();
        assert!(matches!(err, ErrandError::TargetNotFound(_)));
    }
}
