//! Pin level access to one side of a valid/ready stream interface.

use std::fmt;

use crate::error::Result;
use crate::signal::SimObject;
use crate::trigger::Trigger;
use crate::value::LogicVec;

/// Payload carried by a single handshake.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Beat {
    pub data: LogicVec,
    pub keep: Option<LogicVec>,
    pub last: bool,
}

impl Beat {
    pub fn word(data: LogicVec) -> Self {
        Self { data, keep: None, last: true }
    }
}

impl fmt::Display for Beat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.data)?;
        if let Some(keep) = &self.keep {
            write!(f, " keep={}", keep)?;
        }
        if self.last {
            f.write_str(" last")?;
        }
        Ok(())
    }
}

/// Capabilities a transactor needs from one side of the interface. Writes are
/// sampled at the next rising edge, reads return the value at the last edge.
pub trait HandshakePins: Clone + Send + Sync + 'static {
    /// Drive valid together with the beat.
    fn assert(&self, beat: &Beat) -> Result<()>;
    fn deassert(&self) -> Result<()>;
    fn read_valid(&self) -> Result<bool>;
    fn read_ready(&self) -> Result<bool>;
    fn read_data(&self) -> Result<Beat>;
    fn write_ready(&self, ready: bool) -> Result<()>;
    fn next_edge(&self) -> Trigger;

    /// Width of the data bus in bits.
    fn data_width(&self) -> u32;
    /// Width of the byte enable, 0 without one.
    fn keep_width(&self) -> u32;
    /// Whether the bus carries `tlast`.
    fn has_last(&self) -> bool;

    fn handshake(&self) -> Result<bool> {
        Ok(self.read_valid()? && self.read_ready()?)
    }
}

/// Waits edge by edge until `pred` holds. The predicate is evaluated right
/// after each rising edge, never in between.
pub async fn wait_until<P, F>(pins: &P, mut pred: F) -> Result<u64>
where
    P: HandshakePins,
    F: FnMut(&P) -> Result<bool>,
{
    let mut edges = 0;
    loop {
        pins.next_edge().await?;
        edges += 1;
        if pred(pins)? {
            return Ok(edges);
        }
    }
}

/// AXI-Stream signal bundle `<prefix>_tvalid`, `_tready`, `_tdata` and the
/// optional `_tkeep` and `_tlast`.
#[derive(Clone, Copy, Debug)]
pub struct AxisBus {
    clk: SimObject,
    tvalid: SimObject,
    tready: SimObject,
    tdata: SimObject,
    tkeep: Option<SimObject>,
    tlast: Option<SimObject>,
}

impl AxisBus {
    pub fn from_prefix(dut: SimObject, clk: SimObject, prefix: &str) -> Result<Self> {
        Ok(Self {
            clk,
            tvalid: dut.c(&format!("{prefix}_tvalid"))?,
            tready: dut.c(&format!("{prefix}_tready"))?,
            tdata: dut.c(&format!("{prefix}_tdata"))?,
            tkeep: dut.c(&format!("{prefix}_tkeep")).ok(),
            tlast: dut.c(&format!("{prefix}_tlast")).ok(),
        })
    }
}

impl HandshakePins for AxisBus {
    fn assert(&self, beat: &Beat) -> Result<()> {
        self.tdata.set(beat.data.clone())?;
        if let Some(tkeep) = self.tkeep {
            match &beat.keep {
                Some(keep) => tkeep.set(keep.clone())?,
                None => tkeep.set(LogicVec::ones(tkeep.width()))?,
            }
        }
        if let Some(tlast) = self.tlast {
            tlast.set_bool(beat.last)?;
        }
        self.tvalid.set_bool(true)
    }
    fn deassert(&self) -> Result<()> {
        self.tvalid.set_bool(false)
    }
    fn read_valid(&self) -> Result<bool> {
        self.tvalid.is_high()
    }
    fn read_ready(&self) -> Result<bool> {
        self.tready.is_high()
    }
    fn read_data(&self) -> Result<Beat> {
        Ok(Beat {
            data: self.tdata.get()?,
            keep: self.tkeep.map(|k| k.get()).transpose()?,
            last: match self.tlast {
                Some(tlast) => tlast.is_high()?,
                None => true,
            },
        })
    }
    fn write_ready(&self, ready: bool) -> Result<()> {
        self.tready.set_bool(ready)
    }
    fn next_edge(&self) -> Trigger {
        self.clk.rising_edge()
    }
    fn data_width(&self) -> u32 {
        self.tdata.width()
    }
    fn keep_width(&self) -> u32 {
        self.tkeep.map_or(0, |k| k.width())
    }
    fn has_last(&self) -> bool {
        self.tlast.is_some()
    }
}
