//! `pick` and `place`.
//!
//! Both subscribe to [`Topic::Manipulation`] *before* issuing the controller
//! command, so an edge that fires immediately is never missed.  The
//! subscription lives in the handle and is dropped with it.

use errand_middleware::{Topic, TopicReceiver};
use errand_types::{ErrandError, EventPayload, RobotState, UpdateRecord};
use errand_world::{EntityId, PlacementRequest, PlacementSolver, SurfaceProbe, WorldRegistry};
use tracing::{debug, info, warn};

use super::MachineContext;
use crate::completion::{StateMachine, StepStatus};

// ────────────────────────────────────────────────────────────────────────────
// Pick
// ────────────────────────────────────────────────────────────────────────────

pub struct PickMachine<'a> {
    ctx: &'a MachineContext,
}

pub struct PickHandle {
    target: EntityId,
    name: String,
    edges: TopicReceiver,
}

impl<'a> PickMachine<'a> {
    pub fn new(ctx: &'a MachineContext) -> Self {
        Self { ctx }
    }
}

impl StateMachine for PickMachine<'_> {
    type Handle = PickHandle;

    fn name(&self) -> &'static str {
        "pick"
    }

    fn start(&self, argument: &str) -> Result<PickHandle, ErrandError> {
        if let Some(held) = self.ctx.manipulator.held() {
            return Err(ErrandError::PreconditionViolation(format!(
                "already holding {}",
                self.ctx.name_of(held)
            )));
        }
        let target = self.ctx.resolve(argument)?;
        self.ctx.state.transition(RobotState::Idle, RobotState::Picking)?;

        let edges = self.ctx.bus.subscribe_to(Topic::Manipulation);
        if let Err(e) = self.ctx.manipulator.pick(target) {
            self.ctx.state.set(RobotState::Idle);
            return Err(e);
        }
        debug!(object = argument, "pick issued");
        Ok(PickHandle {
            target,
            name: self.ctx.name_of(target),
            edges,
        })
    }

    fn poll(&self, handle: &mut PickHandle) -> StepStatus {
        let attached = handle.edges.drain().into_iter().any(|event| {
            matches!(&event.payload, EventPayload::Attached { object } if object.eq_ignore_ascii_case(&handle.name))
        });
        if attached || self.ctx.manipulator.held() == Some(handle.target) {
            info!(object = %handle.name, "holding");
            return StepStatus::Done(format!("holding {}", handle.name));
        }
        StepStatus::Pending
    }

    fn abort(&self, handle: &mut PickHandle) {
        self.ctx.manipulator.cancel_pending();
        // A pick that raced the deadline still counts as holding.
        if self.ctx.manipulator.held() != Some(handle.target) {
            self.ctx.state.set(RobotState::Idle);
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Place
// ────────────────────────────────────────────────────────────────────────────

pub struct PlaceMachine<'a> {
    ctx: &'a MachineContext,
    solver: PlacementSolver,
}

pub struct PlaceHandle {
    object: EntityId,
    object_name: String,
    surface_name: String,
    edges: TopicReceiver,
}

impl<'a> PlaceMachine<'a> {
    pub fn new(ctx: &'a MachineContext) -> Self {
        Self {
            ctx,
            solver: PlacementSolver::new(ctx.config.placement.clone()),
        }
    }

    /// Back to `Picking` while the hand still holds something, else `Idle`.
    fn settle_state(&self) {
        let state = if self.ctx.manipulator.is_holding() {
            RobotState::Picking
        } else {
            RobotState::Idle
        };
        self.ctx.state.set(state);
    }

    fn placed(&self, handle: &PlaceHandle) -> StepStatus {
        self.ctx.state.set(RobotState::Idle);
        let position = self
            .ctx
            .world
            .read()
            .pose_of(handle.object)
            .map(|p| p.position.to_array())
            .unwrap_or_default();
        self.ctx
            .aggregator
            .record(UpdateRecord::placed(handle.object_name.as_str(), position));
        info!(object = %handle.object_name, surface = %handle.surface_name, "placed");
        StepStatus::Done(format!("placed {} on {}", handle.object_name, handle.surface_name))
    }
}

impl StateMachine for PlaceMachine<'_> {
    type Handle = PlaceHandle;

    fn name(&self) -> &'static str {
        "place"
    }

    fn start(&self, argument: &str) -> Result<PlaceHandle, ErrandError> {
        let Some(object) = self.ctx.manipulator.held() else {
            return Err(ErrandError::PreconditionViolation("not holding anything".into()));
        };
        let current = self.ctx.state.get();
        if current != RobotState::Picking {
            return Err(ErrandError::PreconditionViolation(format!(
                "manipulator is {current}, not holding after a pick"
            )));
        }
        let surface = self.ctx.resolve(argument)?;

        // Read the base position before taking the world lock; the simulated
        // base writes its pose back into the world when queried.
        let robot_position = self.ctx.locomotion.position();
        let pose = {
            let world = self.ctx.world.read();
            let (Some(held_pose), Some(target_pose)) = (world.pose_of(object), world.pose_of(surface))
            else {
                return Err(ErrandError::TargetNotFound(argument.to_string()));
            };
            let request = PlacementRequest {
                held_bounds: world.bounds_of(object),
                held_pose,
                target: surface,
                target_bounds: world.bounds_of(surface),
                target_pose,
                robot_position,
            };
            self.solver
                .solve(&request, Some(&*world as &dyn SurfaceProbe))
                .ok_or_else(|| {
                    ErrandError::PreconditionViolation(format!(
                        "no placement for {} on {argument}: missing bounds",
                        world.name_of(object).unwrap_or("held object")
                    ))
                })?
        };

        self.ctx.state.transition(RobotState::Picking, RobotState::Placing)?;
        let edges = self.ctx.bus.subscribe_to(Topic::Manipulation);
        if !self.ctx.manipulator.place_on(surface, pose) {
            self.ctx.state.set(RobotState::Picking);
            return Err(ErrandError::PreconditionViolation(
                "manipulator refused to place".into(),
            ));
        }
        debug!(surface = argument, x = pose.position.x, y = pose.position.y, z = pose.position.z, "place issued");
        Ok(PlaceHandle {
            object,
            object_name: self.ctx.name_of(object),
            surface_name: self.ctx.name_of(surface),
            edges,
        })
    }

    fn poll(&self, handle: &mut PlaceHandle) -> StepStatus {
        for event in handle.edges.drain() {
            match &event.payload {
                EventPayload::Placed { object, .. } if object.eq_ignore_ascii_case(&handle.object_name) => {
                    return self.placed(handle);
                }
                EventPayload::PlaceAborted { object } if object.eq_ignore_ascii_case(&handle.object_name) => {
                    warn!(object = %object, "object lost before release");
                    self.settle_state();
                    return StepStatus::Failed(ErrandError::PreconditionViolation(format!(
                        "{object} was lost before it could be placed"
                    )));
                }
                _ => {}
            }
        }
        StepStatus::Pending
    }

    fn abort(&self, _handle: &mut PlaceHandle) {
        self.ctx.manipulator.cancel_pending();
        self.settle_state();
    }
}
