use std::sync::Arc;

use crate::axis::{Beat, HandshakePins};
use crate::codec::{Codec, Transaction};
use crate::error::{Error, Result, Violation};
use crate::pacing::{Pacer, PacingMode};
use crate::rstb_obj::RstbObj;
use crate::scoreboard::ReferenceQueue;
use crate::session::Progress;
use crate::sim_if;

/// Watches one side for a beat that is offered and then withdrawn or altered
/// before it is accepted.
pub struct HoldMonitor {
    side: &'static str,
    held: Option<Beat>,
    beat: u64,
}

impl HoldMonitor {
    pub fn new(side: &'static str) -> Self {
        Self { side, held: None, beat: 0 }
    }

    pub fn is_holding(&self) -> bool {
        self.held.is_some()
    }

    /// Samples the pins right after an edge. Returns the beat if it was
    /// accepted at that edge.
    pub fn observe<P: HandshakePins>(&mut self, pins: &P) -> Result<Option<Beat>> {
        let valid = pins.read_valid()?;
        if let Some(held) = &self.held {
            if !valid {
                return Err(Violation::ValidDropped { side: self.side, beat: self.beat }.into());
            }
            let observed = pins.read_data()?;
            if observed != *held {
                return Err(Violation::DataChanged {
                    side: self.side,
                    beat: self.beat,
                    held: held.to_string(),
                    observed: observed.to_string(),
                }
                .into());
            }
        }
        if !valid {
            return Ok(None);
        }
        let data = pins.read_data()?;
        if pins.read_ready()? {
            self.held = None;
            self.beat += 1;
            Ok(Some(data))
        } else {
            self.held = Some(data);
            Ok(None)
        }
    }
}

/// Accepts beats from the egress side, rebuilds transactions and compares
/// them against the reference queue in order.
pub struct Checker<C: Codec, P: HandshakePins> {
    codec: Arc<C>,
    pins: P,
    queue: ReferenceQueue<C::Item>,
    pacer: Box<dyn Pacer>,
    pacing: PacingMode,
    cases: u64,
    progress: Progress,
    record: Option<RstbObj<Vec<C::Item>>>,
}

impl<C: Codec, P: HandshakePins> Checker<C, P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        codec: Arc<C>,
        pins: P,
        queue: ReferenceQueue<C::Item>,
        pacer: Box<dyn Pacer>,
        pacing: PacingMode,
        cases: u64,
        progress: Progress,
        record: Option<RstbObj<Vec<C::Item>>>,
    ) -> Self {
        Self {
            codec,
            pins,
            queue,
            pacer,
            pacing,
            cases,
            progress,
            record,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut monitor = HoldMonitor::new("egress");
        let mut decoder = C::Decoder::default();
        // per attempt pacing keeps ready up once it decided to take the held beat
        let mut armed = false;
        let mut case = 0;

        while case < self.cases {
            let ready = match self.pacing {
                PacingMode::Continuous => !self.pacer.withhold(),
                PacingMode::PerAttempt => {
                    if monitor.is_holding() && !armed {
                        armed = !self.pacer.withhold();
                    }
                    monitor.is_holding() && armed
                }
            };
            self.pins.write_ready(ready)?;
            self.pins.next_edge().await?;

            let Some(beat) = monitor.observe(&self.pins)? else {
                continue;
            };
            armed = false;
            self.progress.beat_out();
            let Some(received) = self.codec.decode(&mut decoder, beat) else {
                continue;
            };
            let expected = self.queue.pop(case)?;
            if expected != received {
                tracing::error!(
                    case,
                    expected = %expected.describe(),
                    received = %received.describe(),
                    "dut and reference are inconsistent"
                );
                return Err(Error::DataMismatch {
                    case,
                    expected: expected.describe(),
                    received: received.describe(),
                });
            }
            tracing::debug!(case, item = %received.describe(), sim_time_ns = sim_if::now_ns(), "check");
            if let Some(record) = &self.record {
                record.with_mut(|r| r.push(received));
            }
            self.progress.case_checked();
            case += 1;
        }
        self.pins.write_ready(false)?;
        tracing::info!(cases = self.cases, sim_time_ns = sim_if::now_ns(), "Checker done");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::Trigger;
    use crate::value::LogicVec;
    use std::sync::Mutex;

    /// Pins whose sampled values are set directly by the test.
    #[derive(Clone, Default)]
    struct FakePins(Arc<Mutex<(bool, bool, u64)>>);

    impl FakePins {
        fn sample(&self, valid: bool, ready: bool, data: u64) {
            *self.0.lock().unwrap() = (valid, ready, data);
        }
    }

    impl HandshakePins for FakePins {
        fn assert(&self, _beat: &Beat) -> Result<()> {
            Ok(())
        }
        fn deassert(&self) -> Result<()> {
            Ok(())
        }
        fn read_valid(&self) -> Result<bool> {
            Ok(self.0.lock().unwrap().0)
        }
        fn read_ready(&self) -> Result<bool> {
            Ok(self.0.lock().unwrap().1)
        }
        fn read_data(&self) -> Result<Beat> {
            Ok(Beat::word(LogicVec::from_u64(8, self.0.lock().unwrap().2)))
        }
        fn write_ready(&self, _ready: bool) -> Result<()> {
            Ok(())
        }
        fn next_edge(&self) -> Trigger {
            Trigger::timer_steps(1)
        }
        fn data_width(&self) -> u32 {
            8
        }
        fn keep_width(&self) -> u32 {
            0
        }
        fn has_last(&self) -> bool {
            false
        }
    }

    #[test]
    fn accepted_beat_is_returned_once() {
        let pins = FakePins::default();
        let mut mon = HoldMonitor::new("egress");
        pins.sample(true, false, 5);
        assert_eq!(mon.observe(&pins), Ok(None));
        assert!(mon.is_holding());
        pins.sample(true, true, 5);
        assert_eq!(mon.observe(&pins), Ok(Some(Beat::word(LogicVec::from_u64(8, 5)))));
        pins.sample(false, true, 0);
        assert_eq!(mon.observe(&pins), Ok(None));
    }

    #[test]
    fn dropping_valid_before_acceptance_is_a_violation() {
        let pins = FakePins::default();
        let mut mon = HoldMonitor::new("egress");
        pins.sample(true, false, 5);
        mon.observe(&pins).unwrap();
        pins.sample(false, false, 5);
        assert_eq!(
            mon.observe(&pins),
            Err(Error::Protocol(Violation::ValidDropped { side: "egress", beat: 0 }))
        );
    }

    #[test]
    fn changing_held_data_is_a_violation() {
        let pins = FakePins::default();
        let mut mon = HoldMonitor::new("egress");
        pins.sample(true, true, 1);
        mon.observe(&pins).unwrap();
        pins.sample(true, false, 2);
        mon.observe(&pins).unwrap();
        pins.sample(true, true, 3);
        let err = mon.observe(&pins).unwrap_err();
        assert!(matches!(err, Error::Protocol(Violation::DataChanged { beat: 1, .. })));
    }
}
