//! Behavioral stand-ins for a compiled design.
//!
//! A [`Device`] declares its ports and is evaluated by the native simulator at
//! every rising edge of its clock port. It samples its inputs as they were
//! before the edge and its output writes become visible after the edge, like
//! registered HDL outputs.

use crate::value::LogicVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDecl {
    pub name: String,
    pub width: u32,
    pub direction: Direction,
}

impl PortDecl {
    pub fn input(name: &str, width: u32) -> Self {
        Self { name: name.to_string(), width, direction: Direction::Input }
    }
    pub fn output(name: &str, width: u32) -> Self {
        Self { name: name.to_string(), width, direction: Direction::Output }
    }
}

pub trait Device {
    /// Name of the toplevel scope.
    fn name(&self) -> &str;
    /// Port list. A port is addressed by its index in this list.
    fn ports(&self) -> Vec<PortDecl>;
    /// Index of the clock port.
    fn clock(&self) -> usize;
    fn on_rising_edge(&mut self, pins: &mut Pins<'_>);
}

/// Port values at a clock edge plus the writes the device makes in response.
pub struct Pins<'a> {
    values: &'a [LogicVec],
    writes: Vec<(usize, LogicVec)>,
}

impl<'a> Pins<'a> {
    pub(crate) fn new(values: &'a [LogicVec]) -> Self {
        Self { values, writes: Vec::new() }
    }

    pub fn read(&self, port: usize) -> &LogicVec {
        &self.values[port]
    }

    pub fn is_high(&self, port: usize) -> bool {
        self.values[port].bit(0)
    }

    pub fn write(&mut self, port: usize, value: LogicVec) {
        self.writes.push((port, value));
    }

    pub fn write_bool(&mut self, port: usize, value: bool) {
        self.write(port, LogicVec::from_bool(value));
    }

    pub(crate) fn into_writes(self) -> Vec<(usize, LogicVec)> {
        self.writes
    }
}
