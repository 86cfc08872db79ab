use crate::error::{Result, SimError};
use crate::sim_if::{self, ObjectKind};
use crate::trigger::Trigger;
use crate::value::LogicVec;

/// Handle to a scope or signal of the design.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SimObject {
    pub(crate) handle: usize,
    pub(crate) kind: ObjectKind,
}

impl SimObject {
    pub fn handle(&self) -> usize {
        self.handle
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn width(&self) -> u32 {
        match self.kind {
            ObjectKind::Vector(width) => width,
            ObjectKind::Scope => 0,
        }
    }

    pub fn name(&self) -> Result<String> {
        Ok(sim_if::current()?.get_full_name(self.handle)?)
    }

    pub fn get_root() -> Result<Self> {
        let sim = sim_if::current()?;
        let handle = sim.get_root_handle()?;
        Ok(SimObject {
            handle,
            kind: sim.get_kind(handle)?,
        })
    }

    pub fn from_name(full_name: &str) -> Result<Self> {
        let sim = sim_if::current()?;
        let handle = sim.get_handle_by_name(full_name)?;
        Ok(SimObject {
            handle,
            kind: sim.get_kind(handle)?,
        })
    }

    /// Child object `name` of this scope.
    pub fn c(&self, name: &str) -> Result<Self> {
        let mut child_name = self.name()?;
        child_name.push('.');
        child_name.push_str(name);
        SimObject::from_name(&child_name)
    }

    pub fn get(&self) -> Result<LogicVec> {
        Ok(sim_if::current()?.get_value(self.handle)?)
    }

    pub fn u64(&self) -> Result<u64> {
        Ok(self.get()?.as_u64())
    }

    pub fn is_high(&self) -> Result<bool> {
        Ok(self.get()?.bit(0))
    }

    pub fn set(&self, value: LogicVec) -> Result<()> {
        if let ObjectKind::Scope = self.kind {
            return Err(SimError::NotAVector(self.name()?).into());
        }
        Ok(sim_if::current()?.set_value(self.handle, value)?)
    }

    pub fn set_u64(&self, value: u64) -> Result<()> {
        self.set(LogicVec::from_u64(self.width(), value))
    }

    pub fn set_bool(&self, value: bool) -> Result<()> {
        self.set_u64(value as u64)
    }

    // convenience functions to get edge triggers for this signal
    pub fn rising_edge(self) -> Trigger {
        Trigger::rising_edge(self)
    }
    pub fn falling_edge(self) -> Trigger {
        Trigger::falling_edge(self)
    }
    pub fn edge(self) -> Trigger {
        Trigger::edge(self)
    }
}
