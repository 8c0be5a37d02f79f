//! Door and switch components.
//!
//! Entities expose their boolean state through explicit capability
//! interfaces ([`HasOpenState`], [`HasOnState`]) and are driven through the
//! controller traits.  Nothing here is inferred from field names.

use errand_types::ErrandError;

/// Anything that can report whether it is open.
pub trait HasOpenState {
    /// `None` when the state is not observable.
    fn is_open(&self) -> Option<bool>;
}

/// Anything that can report whether it is switched on.
pub trait HasOnState {
    fn is_on(&self) -> Option<bool>;
}

/// A controllable door.
pub trait DoorController: HasOpenState + Send + Sync {
    /// Open the door.  Opening an already-open door succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`ErrandError::ActuatorRejected`] if the door refuses to move.
    fn open(&mut self) -> Result<(), ErrandError>;
}

/// A controllable on/off switch.
pub trait SwitchController: HasOnState + Send + Sync {
    /// # Errors
    ///
    /// Returns [`ErrandError::ActuatorRejected`] if the switch refuses.
    fn set_on(&mut self, on: bool) -> Result<(), ErrandError>;

    /// Flip the current state and return the new one.
    fn toggle(&mut self) -> Result<bool, ErrandError> {
        let next = !self.is_on().unwrap_or(false);
        self.set_on(next)?;
        Ok(next)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simple in-world implementations
// ────────────────────────────────────────────────────────────────────────────

/// A hinged door.  A locked door rejects `open`.
#[derive(Debug, Clone, Default)]
pub struct Door {
    open: bool,
    locked: bool,
}

impl Door {
    pub fn closed() -> Self {
        Self::default()
    }

    pub fn locked() -> Self {
        Self {
            open: false,
            locked: true,
        }
    }
}

impl HasOpenState for Door {
    fn is_open(&self) -> Option<bool> {
        Some(self.open)
    }
}

impl DoorController for Door {
    fn open(&mut self) -> Result<(), ErrandError> {
        if self.locked {
            return Err(ErrandError::ActuatorRejected("door is locked".into()));
        }
        self.open = true;
        Ok(())
    }
}

/// A wall switch driving zero or more light entities by name.
#[derive(Debug, Clone, Default)]
pub struct Switch {
    on: bool,
    lights: Vec<String>,
}

impl Switch {
    pub fn off() -> Self {
        Self::default()
    }

    /// Bind a light entity to this switch.
    pub fn binding(mut self, light: impl Into<String>) -> Self {
        self.lights.push(light.into());
        self
    }

    pub fn lights(&self) -> &[String] {
        &self.lights
    }
}

impl HasOnState for Switch {
    fn is_on(&self) -> Option<bool> {
        Some(self.on)
    }
}

impl SwitchController for Switch {
    fn set_on(&mut self, on: bool) -> Result<(), ErrandError> {
        self.on = on;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn door_opens_once_and_stays_open() {
        let mut door = Door::closed();
        assert_eq!(door.is_open(), Some(false));
        door.open().unwrap();
        door.open().unwrap();
        assert_eq!(door.is_open(), Some(true));
    }

    #[test]
    fn locked_door_rejects_open() {
        let mut door = Door::locked();
        assert!(matches!(door.open(), Err(ErrandError::ActuatorRejected(_))));
        assert_eq!(door.is_open(), Some(false));
    }

    #[test]
    fn switch_toggle_flips_state() {
        let mut sw = Switch::off().binding("lamp_02");
        assert_eq!(sw.toggle().unwrap(), true);
        assert_eq!(sw.toggle().unwrap(), false);
        sw.set_on(true).unwrap();
        assert_eq!(sw.is_on(), Some(true));
        assert_eq!(sw.lights(), ["lamp_02".to_string()]);
    }
}
