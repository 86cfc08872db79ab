//! Randomized backpressure on both sides of the interface.

use rand::rngs::StdRng;
use rand::Rng;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::signal::SimObject;

/// How pause decisions are made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacingMode {
    /// Each transactor draws its own decision whenever it is about to offer
    /// or accept a beat.
    #[default]
    PerAttempt,
    /// A free running task redraws both sides every clock edge.
    Continuous,
}

impl fmt::Display for PacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PacingMode::PerAttempt => "per-attempt",
            PacingMode::Continuous => "continuous",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Ingress,
    Egress,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Ingress => "ingress",
            Side::Egress => "egress",
        }
    }
}

/// Current pause flag of each side. Written by the randomizer only.
#[derive(Clone, Default)]
pub struct PauseState {
    ingress: Arc<AtomicBool>,
    egress: Arc<AtomicBool>,
}

impl PauseState {
    pub fn new() -> Self {
        Self::default()
    }
    fn flag(&self, side: Side) -> &AtomicBool {
        match side {
            Side::Ingress => &self.ingress,
            Side::Egress => &self.egress,
        }
    }
    pub fn paused(&self, side: Side) -> bool {
        self.flag(side).load(Ordering::Relaxed)
    }
    fn set(&self, side: Side, paused: bool) {
        self.flag(side).store(paused, Ordering::Relaxed);
    }
}

/// Source of withhold decisions for one transactor.
pub trait Pacer: Send {
    /// True if the transactor should hold back for the coming edge.
    fn withhold(&mut self) -> bool;
}

/// Draws a fresh decision on every call.
pub struct BernoulliPacer {
    rng: StdRng,
    pause_rate: f64,
}

impl BernoulliPacer {
    pub fn new(rng: StdRng, pause_rate: f64) -> Self {
        Self { rng, pause_rate }
    }
}

impl Pacer for BernoulliPacer {
    fn withhold(&mut self) -> bool {
        self.pause_rate > 0.0 && self.rng.gen_bool(self.pause_rate)
    }
}

/// Follows the decision the randomizer made for one side.
pub struct SharedPacer {
    state: PauseState,
    side: Side,
}

impl SharedPacer {
    pub fn new(state: PauseState, side: Side) -> Self {
        Self { state, side }
    }
}

impl Pacer for SharedPacer {
    fn withhold(&mut self) -> bool {
        self.state.paused(self.side)
    }
}

/// Redraws both pause flags, then again after every rising edge. Never returns
/// on its own, the session cancels it.
pub async fn randomizer(clk: SimObject, state: PauseState, pause_rate: f64, mut rng: StdRng) -> Result<()> {
    tracing::debug!(pause_rate, "Start random pause");
    loop {
        for side in [Side::Ingress, Side::Egress] {
            state.set(side, pause_rate > 0.0 && rng.gen_bool(pause_rate));
        }
        clk.rising_edge().await?;
    }
}
