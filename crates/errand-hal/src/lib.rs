//! `errand-hal` – Controller interfaces for a mobile manipulator.
//!
//! The execution engine drives hardware exclusively through the
//! [`Locomotion`] and [`Manipulator`] traits.  [`SimRobot`] implements both
//! against a shared [`World`][errand_world::World] for demos and tests, and
//! [`SimSceneBuilder`] assembles the world it runs in.
//!
//! # Modules
//!
//! - [`locomotion`] – path-following base with arrival predicates.
//! - [`manipulator`] – arm and gripper with asynchronous attach / place.
//! - [`sim`] – [`SimRobot`] and its fault-injection config.
//! - [`scene`] – [`SimSceneBuilder`] and the stock demo scene.

pub mod locomotion;
pub mod manipulator;
pub mod scene;
pub mod sim;

pub use locomotion::Locomotion;
pub use manipulator::Manipulator;
pub use scene::{ROBOT_NAME, SimScene, SimSceneBuilder};
pub use sim::{SimRobot, SimRobotConfig};
