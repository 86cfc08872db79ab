use rand::rngs::StdRng;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::axis::{self, HandshakePins};
use crate::codec::{Codec, Transaction};
use crate::error::Result;
use crate::pacing::Pacer;
use crate::scoreboard::ReferenceQueue;
use crate::session::Progress;
use crate::sim_if;

/// Offers transactions on the ingress side of the device and records every
/// accepted one in the reference queue.
pub struct Driver<C: Codec, P: HandshakePins> {
    codec: Arc<C>,
    pins: P,
    queue: ReferenceQueue<C::Item>,
    pacer: Box<dyn Pacer>,
    rng: StdRng,
    cases: u64,
    stimulus: VecDeque<C::Item>,
    progress: Progress,
}

impl<C: Codec, P: HandshakePins> Driver<C, P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        codec: Arc<C>,
        pins: P,
        queue: ReferenceQueue<C::Item>,
        pacer: Box<dyn Pacer>,
        rng: StdRng,
        cases: u64,
        stimulus: Vec<C::Item>,
        progress: Progress,
    ) -> Self {
        Self {
            codec,
            pins,
            queue,
            pacer,
            rng,
            cases,
            stimulus: stimulus.into(),
            progress,
        }
    }

    fn next_item(&mut self) -> C::Item {
        match self.stimulus.pop_front() {
            Some(item) => item,
            None => self.codec.generate(&mut self.rng),
        }
    }

    pub async fn run(mut self) -> Result<()> {
        self.pins.deassert()?;
        for case in 0..self.cases {
            let item = self.next_item();
            tracing::debug!(case, item = %item.describe(), sim_time_ns = sim_if::now_ns(), "drive");
            for beat in self.codec.encode(&item) {
                while self.pacer.withhold() {
                    self.pins.deassert()?;
                    self.pins.next_edge().await?;
                }
                // the beat stays on the bus untouched until it is accepted
                self.pins.assert(&beat)?;
                axis::wait_until(&self.pins, |p| p.handshake()).await?;
                self.progress.beat_in();
                tracing::trace!(case, beat = %beat, "beat accepted");
            }
            self.queue.push(item)?;
            self.progress.case_driven();
        }
        self.pins.deassert()?;
        tracing::info!(cases = self.cases, sim_time_ns = sim_if::now_ns(), "Driver done");
        Ok(())
    }
}
