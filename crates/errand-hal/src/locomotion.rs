//! [`Locomotion`] – the mobile base as the execution engine sees it.
//!
//! Path planning is a black box: the engine issues a destination and then
//! only watches the controller's progress predicates.

use errand_types::ErrandError;
use errand_world::Vec3;

pub trait Locomotion: Send + Sync {
    /// Stable identifier, e.g. `"base"`.
    fn id(&self) -> &str;

    /// Start driving towards `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrandError::ActuatorRejected`] when the base cannot accept a
    /// new goal.
    fn move_to(&self, destination: Vec3) -> Result<(), ErrandError>;

    /// Same as [`move_to`](Self::move_to) while carrying the held object.
    fn move_while_holding(&self, destination: Vec3) -> Result<(), ErrandError>;

    /// Cancel the current goal and come to rest where the base is.
    fn stop(&self);

    /// True while a path to the current goal is still being computed.
    fn path_pending(&self) -> bool;

    /// True while the base follows a path.
    fn has_path(&self) -> bool;

    /// Distance left along the current path, metres.
    fn remaining_distance(&self) -> f32;

    /// Distance from the goal at which the base starts braking, metres.
    fn stopping_distance(&self) -> f32;

    /// Current speed, m/s.
    fn speed(&self) -> f32;

    fn position(&self) -> Vec3;

    /// Arrival predicate: the path is computed, the base is within
    /// `stopping_distance + tolerance` of the goal, and it has either
    /// dropped its path or its squared speed is below `residual_speed`.
    fn arrived(&self, tolerance: f32, residual_speed: f32) -> bool {
        if self.path_pending() {
            return false;
        }
        let close = self.remaining_distance() <= self.stopping_distance() + tolerance;
        let settled = !self.has_path() || self.speed() * self.speed() < residual_speed;
        close && settled
    }
}
