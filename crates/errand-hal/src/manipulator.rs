//! [`Manipulator`] – the arm and gripper.
//!
//! `pick` and `place_on` only *start* the motion.  Completion is signalled
//! asynchronously: the controller publishes
//! [`EventPayload::Attached`][errand_types::EventPayload::Attached] and
//! [`EventPayload::Placed`][errand_types::EventPayload::Placed] edges on
//! [`Topic::Manipulation`][errand_middleware::Topic::Manipulation], and
//! [`is_holding`](Manipulator::is_holding) can be polled at any time.

use errand_types::ErrandError;
use errand_world::{EntityId, Pose};

pub trait Manipulator: Send + Sync {
    /// Stable identifier, e.g. `"arm"`.
    fn id(&self) -> &str;

    /// Turn towards `target` and grasp it.
    ///
    /// # Errors
    ///
    /// Returns [`ErrandError::PreconditionViolation`] while already holding
    /// an object, or [`ErrandError::TargetNotFound`] for an unknown entity.
    fn pick(&self, target: EntityId) -> Result<(), ErrandError>;

    /// Turn towards `surface` and release the held object at `pose`.
    ///
    /// Returns `false` (and does nothing) when nothing is held.
    fn place_on(&self, surface: EntityId, pose: Pose) -> bool;

    fn is_holding(&self) -> bool;

    fn held(&self) -> Option<EntityId>;

    /// Abandon any attach or place still in flight.  A cancelled attach never
    /// lands, and a cancelled place leaves the object in hand.
    fn cancel_pending(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Synchronous gripper: attaches and releases immediately.
    #[derive(Default)]
    struct MockGripper {
        held: Mutex<Option<EntityId>>,
        placed: Mutex<Vec<(EntityId, Pose)>>,
    }

    impl Manipulator for MockGripper {
        fn id(&self) -> &str {
            "mock_gripper"
        }
        fn pick(&self, target: EntityId) -> Result<(), ErrandError> {
            let mut held = self.held.lock().unwrap();
            if held.is_some() {
                return Err(ErrandError::PreconditionViolation("already holding".into()));
            }
            *held = Some(target);
            Ok(())
        }
        fn place_on(&self, surface: EntityId, pose: Pose) -> bool {
            if self.held.lock().unwrap().take().is_none() {
                return false;
            }
            self.placed.lock().unwrap().push((surface, pose));
            true
        }
        fn is_holding(&self) -> bool {
            self.held.lock().unwrap().is_some()
        }
        fn held(&self) -> Option<EntityId> {
            *self.held.lock().unwrap()
        }
        fn cancel_pending(&self) {}
    }

    fn some_entities() -> (EntityId, EntityId) {
        let mut world = errand_world::World::new();
        let a = world.spawn(errand_world::Entity::new("laptop"), None).unwrap();
        let b = world.spawn(errand_world::Entity::new("desk"), None).unwrap();
        (a, b)
    }

    #[test]
    fn pick_then_place_cycle() {
        let (laptop, desk) = some_entities();
        let arm = MockGripper::default();
        arm.pick(laptop).unwrap();
        assert!(arm.is_holding());
        assert_eq!(arm.held(), Some(laptop));
        assert!(matches!(arm.pick(desk), Err(ErrandError::PreconditionViolation(_))));

        assert!(arm.place_on(desk, Pose::default()));
        assert!(!arm.is_holding());
        assert!(!arm.place_on(desk, Pose::default()));
        assert_eq!(arm.placed.lock().unwrap().len(), 1);
    }
}
