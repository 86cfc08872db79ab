//! Behavioral AXI-Stream FIFO with optional fault injection.

use std::collections::VecDeque;

use crate::axis::Beat;
use crate::device::{Device, Pins, PortDecl};
use crate::error::{Error, Result};
use crate::value::LogicVec;

/// Deliberate misbehavior, used to prove the harness catches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fault {
    #[default]
    None,
    /// Flips bit 0 of the given output beat.
    Corrupt { beat: u64 },
    /// Accepts the given input beat and throws it away.
    Drop { beat: u64 },
    /// Stops moving data for good as soon as the FIFO is full.
    WedgeWhenFull,
    /// Changes the data of the given output beat for one cycle while it waits
    /// to be accepted.
    Glitch { beat: u64 },
}

#[derive(Debug, Clone)]
pub struct FifoConfig {
    pub name: String,
    pub data_width: u32,
    /// Width of `tkeep`. With a keep signal the FIFO also carries `tlast`.
    pub keep_width: Option<u32>,
    pub depth: usize,
    pub fault: Fault,
}

impl FifoConfig {
    pub fn word(data_width: u32, depth: usize) -> Self {
        Self {
            name: "axis_fifo".to_string(),
            data_width,
            keep_width: None,
            depth,
            fault: Fault::None,
        }
    }
    pub fn frame(bus_bytes: u32, depth: usize) -> Self {
        Self {
            keep_width: Some(bus_bytes),
            ..Self::word(bus_bytes * 8, depth)
        }
    }
    pub fn fault(mut self, fault: Fault) -> Self {
        self.fault = fault;
        self
    }
}

// port indices
struct PortMap {
    clk: usize,
    rst_n: usize,
    s_valid: usize,
    s_ready: usize,
    s_data: usize,
    s_keep: Option<usize>,
    s_last: Option<usize>,
    m_valid: usize,
    m_ready: usize,
    m_data: usize,
    m_keep: Option<usize>,
    m_last: Option<usize>,
}

/// Registered FIFO: inputs are sampled at the rising edge, outputs change right
/// after it. `depth` counts every stored beat including the output register.
pub struct AxisFifo {
    config: FifoConfig,
    ports: Vec<PortDecl>,
    map: PortMap,
    queue: VecDeque<Beat>,
    out: Option<Beat>,
    out_index: u64,
    s_ready: bool,
    beats_in: u64,
    beats_out: u64,
    glitched: bool,
    wedged: bool,
}

impl AxisFifo {
    pub fn new(config: FifoConfig) -> Result<Self> {
        if config.depth == 0 {
            return Err(Error::Config("fifo depth must be at least 1".into()));
        }
        if config.data_width == 0 || config.keep_width == Some(0) {
            return Err(Error::Config("fifo ports must be at least 1 bit wide".into()));
        }
        let mut ports = Vec::new();
        let mut add = |decl: PortDecl| {
            ports.push(decl);
            ports.len() - 1
        };
        let clk = add(PortDecl::input("CLK", 1));
        let rst_n = add(PortDecl::input("RST_N", 1));
        let s_valid = add(PortDecl::input("s_axis_tvalid", 1));
        let s_ready = add(PortDecl::output("s_axis_tready", 1));
        let s_data = add(PortDecl::input("s_axis_tdata", config.data_width));
        let s_keep = config.keep_width.map(|w| add(PortDecl::input("s_axis_tkeep", w)));
        let s_last = config.keep_width.map(|_| add(PortDecl::input("s_axis_tlast", 1)));
        let m_valid = add(PortDecl::output("m_axis_tvalid", 1));
        let m_ready = add(PortDecl::input("m_axis_tready", 1));
        let m_data = add(PortDecl::output("m_axis_tdata", config.data_width));
        let m_keep = config.keep_width.map(|w| add(PortDecl::output("m_axis_tkeep", w)));
        let m_last = config.keep_width.map(|_| add(PortDecl::output("m_axis_tlast", 1)));
        let map = PortMap {
            clk,
            rst_n,
            s_valid,
            s_ready,
            s_data,
            s_keep,
            s_last,
            m_valid,
            m_ready,
            m_data,
            m_keep,
            m_last,
        };
        Ok(Self {
            config,
            ports,
            map,
            queue: VecDeque::new(),
            out: None,
            out_index: 0,
            s_ready: false,
            beats_in: 0,
            beats_out: 0,
            glitched: false,
            wedged: false,
        })
    }

    fn occupancy(&self) -> usize {
        self.queue.len() + self.out.is_some() as usize
    }

    fn sample_input(&self, pins: &Pins<'_>) -> Beat {
        Beat {
            data: pins.read(self.map.s_data).clone(),
            keep: self.map.s_keep.map(|p| pins.read(p).clone()),
            last: self.map.s_last.map_or(true, |p| pins.is_high(p)),
        }
    }

    fn reset(&mut self) {
        self.queue.clear();
        self.out = None;
        self.s_ready = false;
        self.glitched = false;
        self.wedged = false;
        self.out_index = self.beats_out;
    }

    fn drive_outputs(&self, pins: &mut Pins<'_>, glitch: bool) {
        pins.write_bool(self.map.s_ready, self.s_ready);
        pins.write_bool(self.map.m_valid, self.out.is_some());
        let Some(beat) = &self.out else {
            pins.write(self.map.m_data, LogicVec::zero(self.config.data_width));
            if let (Some(p), Some(w)) = (self.map.m_keep, self.config.keep_width) {
                pins.write(p, LogicVec::zero(w));
            }
            if let Some(p) = self.map.m_last {
                pins.write_bool(p, false);
            }
            return;
        };
        let mut data = beat.data.clone();
        let corrupt = matches!(self.config.fault, Fault::Corrupt { beat } if beat == self.out_index);
        if corrupt || glitch {
            let bit = data.bit(0);
            data.set_bit(0, !bit);
        }
        pins.write(self.map.m_data, data);
        if let (Some(p), Some(keep)) = (self.map.m_keep, &beat.keep) {
            pins.write(p, keep.clone());
        }
        if let Some(p) = self.map.m_last {
            pins.write_bool(p, beat.last);
        }
    }
}

impl Device for AxisFifo {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn ports(&self) -> Vec<PortDecl> {
        self.ports.clone()
    }

    fn clock(&self) -> usize {
        self.map.clk
    }

    fn on_rising_edge(&mut self, pins: &mut Pins<'_>) {
        if !pins.is_high(self.map.rst_n) {
            self.reset();
            self.drive_outputs(pins, false);
            return;
        }

        let mut waiting = false;
        if self.out.is_some() {
            if pins.is_high(self.map.m_ready) {
                self.out = None;
                self.beats_out += 1;
                self.glitched = false;
            } else {
                waiting = true;
            }
        }

        if self.s_ready && pins.is_high(self.map.s_valid) {
            let beat = self.sample_input(pins);
            let dropped = matches!(self.config.fault, Fault::Drop { beat } if beat == self.beats_in);
            self.beats_in += 1;
            if !dropped {
                self.queue.push_back(beat);
            }
        }

        if self.config.fault == Fault::WedgeWhenFull && self.occupancy() >= self.config.depth {
            self.wedged = true;
        }

        if self.out.is_none() && !self.wedged {
            if let Some(beat) = self.queue.pop_front() {
                self.out = Some(beat);
                self.out_index = self.beats_out;
            }
        }
        self.s_ready = !self.wedged && self.occupancy() < self.config.depth;

        let glitch = waiting
            && !self.glitched
            && matches!(self.config.fault, Fault::Glitch { beat } if beat == self.out_index);
        if glitch {
            self.glitched = true;
        }
        self.drive_outputs(pins, glitch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(fifo: &mut AxisFifo, values: &mut Vec<LogicVec>) {
        let mut pins = Pins::new(values);
        fifo.on_rising_edge(&mut pins);
        for (port, value) in pins.into_writes() {
            values[port] = value;
        }
    }

    fn fresh(config: FifoConfig) -> (AxisFifo, Vec<LogicVec>) {
        let fifo = AxisFifo::new(config).unwrap();
        let values = fifo.ports().iter().map(|p| LogicVec::zero(p.width)).collect();
        (fifo, values)
    }

    #[test]
    fn holds_outputs_low_in_reset() {
        let (mut fifo, mut v) = fresh(FifoConfig::word(8, 4));
        v[fifo.map.s_valid] = LogicVec::from_bool(true);
        edge(&mut fifo, &mut v);
        assert!(!v[fifo.map.s_ready].bit(0));
        assert!(!v[fifo.map.m_valid].bit(0));
    }

    #[test]
    fn passes_beats_in_order_and_fills_up() {
        let (mut fifo, mut v) = fresh(FifoConfig::word(8, 2));
        let (rst_n, s_valid, s_data) = (fifo.map.rst_n, fifo.map.s_valid, fifo.map.s_data);
        v[rst_n] = LogicVec::from_bool(true);
        edge(&mut fifo, &mut v);
        assert!(v[fifo.map.s_ready].bit(0));
        v[s_valid] = LogicVec::from_bool(true);
        for d in [0x11, 0x22] {
            v[s_data] = LogicVec::from_u64(8, d);
            edge(&mut fifo, &mut v);
        }
        assert!(!v[fifo.map.s_ready].bit(0), "full after depth beats");
        assert_eq!(v[fifo.map.m_data].as_u64(), 0x11);
        v[s_valid] = LogicVec::from_bool(false);
        v[fifo.map.m_ready] = LogicVec::from_bool(true);
        edge(&mut fifo, &mut v);
        assert_eq!(v[fifo.map.m_data].as_u64(), 0x22);
        edge(&mut fifo, &mut v);
        assert!(!v[fifo.map.m_valid].bit(0));
    }

    #[test]
    fn glitch_changes_data_for_one_cycle() {
        let (mut fifo, mut v) = fresh(FifoConfig::word(8, 2).fault(Fault::Glitch { beat: 0 }));
        v[fifo.map.rst_n] = LogicVec::from_bool(true);
        edge(&mut fifo, &mut v);
        v[fifo.map.s_valid] = LogicVec::from_bool(true);
        v[fifo.map.s_data] = LogicVec::from_u64(8, 0x10);
        edge(&mut fifo, &mut v);
        v[fifo.map.s_valid] = LogicVec::from_bool(false);
        assert_eq!(v[fifo.map.m_data].as_u64(), 0x10);
        edge(&mut fifo, &mut v);
        assert_eq!(v[fifo.map.m_data].as_u64(), 0x11);
        edge(&mut fifo, &mut v);
        assert_eq!(v[fifo.map.m_data].as_u64(), 0x10);
    }

    #[test]
    fn zero_depth_is_rejected() {
        assert!(matches!(AxisFifo::new(FifoConfig::word(8, 0)), Err(Error::Config(_))));
    }
}
