use crate::error::{Result, Violation};
use crate::executor::{JoinHandle, Task};
use crate::signal::SimObject;
use crate::sim_if;
use crate::trigger::Trigger;
use crate::utils;

pub const RESET_ASSERT_CYCLES: u64 = 2;
pub const RESET_SETTLE_CYCLES: u64 = 2;

/*
 * CLOCK
 */
pub async fn clock(clk: SimObject, period: u64, unit: &str) -> Result<()> {
    let high_t = period / 2;
    let low_t = period - high_t;
    if period % 2 != 0 {
        sim_if::current()?.log(&format!(
            "Warning: Clock period {period}{unit} not dividable by 2. High time will be {high_t}{unit}; low time will be {low_t}{unit}."
        ));
    }
    loop {
        clk.set_bool(false)?;
        Trigger::timer(low_t, unit)?.await?;
        clk.set_bool(true)?;
        Trigger::timer(high_t, unit)?.await?;
    }
}

/// Drives the free running clock and the active low reset of the design.
pub struct Sequencer {
    clk: SimObject,
    rst_n: SimObject,
    period_ns: u64,
    clock_task: Option<JoinHandle>,
}

impl Sequencer {
    pub fn new(clk: SimObject, rst_n: SimObject, period_ns: u64) -> Self {
        Self {
            clk,
            rst_n,
            period_ns,
            clock_task: None,
        }
    }

    pub fn clk(&self) -> SimObject {
        self.clk
    }

    /// Starts the clock. Must be called exactly once.
    pub fn start(&mut self) -> Result<()> {
        if self.clock_task.is_some() {
            return Err(Violation::ClockAlreadyStarted.into());
        }
        let period_ps = self.period_ns * 1000;
        // conversion errors surface here instead of inside the clock task
        sim_if::current()?.get_sim_steps((period_ps / 2) as f64, "ps")?;
        self.clock_task = Some(Task::spawn_from_future(
            clock(self.clk, period_ps, "ps"),
            "clock",
        ));
        tracing::info!(period_ns = self.period_ns, "Start dut clock");
        Ok(())
    }

    /// Holds reset for a fixed number of edges, releases it and lets the design settle.
    pub async fn reset(&self) -> Result<()> {
        self.rst_n.set_bool(false)?;
        utils::clock_cycles(self.clk, RESET_ASSERT_CYCLES).await?;
        self.rst_n.set_bool(true)?;
        utils::clock_cycles(self.clk, RESET_SETTLE_CYCLES).await?;
        tracing::info!(sim_time_ns = sim_if::now_ns(), "Complete reset dut");
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.clock_task.take() {
            task.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::fifo::{AxisFifo, FifoConfig};
    use crate::native::Simulator;

    #[test]
    fn reset_takes_four_edges_and_clock_starts_once() {
        let fifo = AxisFifo::new(FifoConfig::word(8, 2)).unwrap();
        let (ready, t) = Simulator::new(fifo)
            .run(|dut| async move {
                let mut seq = Sequencer::new(dut.c("CLK")?, dut.c("RST_N")?, 10);
                seq.start()?;
                assert_eq!(seq.start(), Err(Error::Protocol(Violation::ClockAlreadyStarted)));
                let ready_in_reset = dut.c("s_axis_tready")?.is_high()?;
                seq.reset().await?;
                assert!(!ready_in_reset);
                let ready = dut.c("s_axis_tready")?.is_high()?;
                let t = sim_if::now_ns();
                seq.stop();
                Ok((ready, t))
            })
            .unwrap();
        assert!(ready);
        // first rising edge after half a period, then four more periods
        assert!((t - 35.0).abs() < 1e-6, "{t}");
    }
}
