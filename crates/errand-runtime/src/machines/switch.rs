//! `switchon`, `switchoff` and `switch` – flip a switch synchronously.

use errand_types::{Capability, ErrandError, UpdateRecord};
use errand_world::WorldRegistry;
use tracing::info;

use super::MachineContext;
use crate::completion::{StateMachine, StepStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchCommand {
    On,
    Off,
    Toggle,
}

pub struct SwitchMachine<'a> {
    ctx: &'a MachineContext,
    command: SwitchCommand,
}

/// Detail string, ready on the first poll.
pub struct SwitchHandle(String);

impl<'a> SwitchMachine<'a> {
    pub fn new(ctx: &'a MachineContext, command: SwitchCommand) -> Self {
        Self { ctx, command }
    }
}

impl StateMachine for SwitchMachine<'_> {
    type Handle = SwitchHandle;

    fn name(&self) -> &'static str {
        "switch"
    }

    fn start(&self, argument: &str) -> Result<SwitchHandle, ErrandError> {
        let on = {
            let mut world = self.ctx.world.write();
            let named = world.find_by_name(argument);
            let switch = named
                .and_then(|id| world.find_capable(id, Capability::Switch))
                .or_else(|| world.find_ignore_case(argument, Capability::Switch))
                .ok_or_else(|| match named {
                    Some(_) => ErrandError::CapabilityMissing {
                        entity: argument.to_string(),
                        capability: Capability::Switch,
                    },
                    None => ErrandError::TargetNotFound(argument.to_string()),
                })?;
            let controller = world
                .switch_mut(switch)
                .ok_or_else(|| ErrandError::CapabilityMissing {
                    entity: argument.to_string(),
                    capability: Capability::Switch,
                })?;
            match self.command {
                SwitchCommand::On => controller.set_on(true).map(|()| true)?,
                SwitchCommand::Off => controller.set_on(false).map(|()| false)?,
                SwitchCommand::Toggle => controller.toggle()?,
            }
        };
        self.ctx.aggregator.record(UpdateRecord::switched(argument, on));
        info!(switch = argument, on, "switch set");
        Ok(SwitchHandle(format!(
            "{argument} {}",
            if on { "on" } else { "off" }
        )))
    }

    fn poll(&self, handle: &mut SwitchHandle) -> StepStatus {
        StepStatus::Done(handle.0.clone())
    }

    fn abort(&self, _handle: &mut SwitchHandle) {}
}
