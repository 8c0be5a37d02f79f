//! Action state machines.
//!
//! One machine per verb family, all implementing
//! [`StateMachine`][crate::completion::StateMachine]:
//!
//! | Machine | Verbs | Waits on |
//! |---|---|---|
//! | [`LocomotionMachine`] | `move` | arrival predicate, then a settle delay |
//! | [`PickMachine`] | `pick` | `Attached` edge or the holding flag |
//! | [`PlaceMachine`] | `place` | `Placed` / `PlaceAborted` edge |
//! | [`DoorMachine`] | `open` | settle delay only |
//! | [`SwitchMachine`] | `switchon`, `switchoff`, `switch` | nothing |
//!
//! Machines borrow a [`MachineContext`] and are cheap to build per action.

mod door;
mod locomotion;
mod manipulation;
mod switch;

use std::sync::Arc;

use errand_hal::{Locomotion, Manipulator};
use errand_middleware::EventBus;
use errand_types::ErrandError;
use errand_world::{EntityId, SharedWorld, WorldRegistry};

use crate::aggregator::UpdateAggregator;
use crate::config::ExecutorConfig;
use crate::robot_state::RobotStateHandle;

pub use door::DoorMachine;
pub use locomotion::LocomotionMachine;
pub use manipulation::{PickMachine, PlaceMachine};
pub use switch::{SwitchCommand, SwitchMachine};

/// Subject used for the robot's own `move` records.
pub const ROBOT_SUBJECT: &str = "robot";

/// Everything a state machine may touch.
#[derive(Clone)]
pub struct MachineContext {
    pub world: SharedWorld,
    pub locomotion: Arc<dyn Locomotion>,
    pub manipulator: Arc<dyn Manipulator>,
    pub state: RobotStateHandle,
    pub aggregator: UpdateAggregator,
    pub bus: EventBus,
    pub config: ExecutorConfig,
}

impl MachineContext {
    /// Context for a robot that is both base and arm, starting `Idle`.
    pub fn new<R>(
        world: SharedWorld,
        robot: R,
        bus: EventBus,
        aggregator: UpdateAggregator,
        config: ExecutorConfig,
    ) -> Self
    where
        R: Locomotion + Manipulator + Clone + 'static,
    {
        Self {
            world,
            locomotion: Arc::new(robot.clone()),
            manipulator: Arc::new(robot),
            state: RobotStateHandle::default(),
            aggregator,
            bus,
            config,
        }
    }

    /// Exact-name lookup.
    pub(crate) fn resolve(&self, name: &str) -> Result<EntityId, ErrandError> {
        self.world
            .read()
            .find_by_name(name)
            .ok_or_else(|| ErrandError::TargetNotFound(name.to_string()))
    }

    pub(crate) fn name_of(&self, id: EntityId) -> String {
        self.world
            .read()
            .name_of(id)
            .map(str::to_string)
            .unwrap_or_else(|| id.to_string())
    }
}
