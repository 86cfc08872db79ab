//! One complete stress run against a device: clock, reset, traffic on both
//! sides, liveness watchdog and the final verdict.

use futures::future;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::axis::AxisBus;
use crate::checker::Checker;
use crate::codec::Codec;
use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::executor::Task;
use crate::pacing::{self, BernoulliPacer, PacingMode, Pacer, PauseState, SharedPacer, Side};
use crate::rstb_obj::RstbObj;
use crate::scoreboard::ReferenceQueue;
use crate::signal::SimObject;
use crate::sim_if;
use crate::testbench::Sequencer;
use crate::utils;

pub const DEFAULT_CASES: u64 = 2000;
pub const DEFAULT_PAUSE_RATE: f64 = 0.5;
pub const DEFAULT_CLOCK_PERIOD_NS: u64 = 10;
const MIN_STALL_CYCLES: u64 = 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub cases: u64,
    /// Probability that a side holds back on a given attempt or cycle.
    pub pause_rate: f64,
    pub pacing: PacingMode,
    pub clock_period_ns: u64,
    /// Total cycles after reset before the run is given up, unbounded if unset.
    pub timeout_cycles: Option<u64>,
    /// Cycles without any accepted beat before the run counts as deadlocked.
    pub stall_cycles: Option<u64>,
    /// Drawn from the OS if unset.
    pub seed: Option<u64>,
    /// Keep every checked transaction in the report.
    pub record: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cases: DEFAULT_CASES,
            pause_rate: DEFAULT_PAUSE_RATE,
            pacing: PacingMode::PerAttempt,
            clock_period_ns: DEFAULT_CLOCK_PERIOD_NS,
            timeout_cycles: None,
            stall_cycles: None,
            seed: None,
            record: false,
        }
    }
}

impl SessionConfig {
    pub fn cases(mut self, cases: u64) -> Self {
        self.cases = cases;
        self
    }
    pub fn pause_rate(mut self, pause_rate: f64) -> Self {
        self.pause_rate = pause_rate;
        self
    }
    pub fn pacing(mut self, pacing: PacingMode) -> Self {
        self.pacing = pacing;
        self
    }
    pub fn clock_period_ns(mut self, ns: u64) -> Self {
        self.clock_period_ns = ns;
        self
    }
    pub fn timeout_cycles(mut self, cycles: u64) -> Self {
        self.timeout_cycles = Some(cycles);
        self
    }
    pub fn stall_cycles(mut self, cycles: u64) -> Self {
        self.stall_cycles = Some(cycles);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn record(mut self, record: bool) -> Self {
        self.record = record;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.cases == 0 {
            return Err(Error::Config("cases must be at least 1".into()));
        }
        if !(0.0..1.0).contains(&self.pause_rate) {
            return Err(Error::Config(format!(
                "pause rate {} is out of range [0, 1)",
                self.pause_rate
            )));
        }
        if self.clock_period_ns == 0 {
            return Err(Error::Config("clock period must be at least 1 ns".into()));
        }
        if self.timeout_cycles == Some(0) || self.stall_cycles == Some(0) {
            return Err(Error::Config("cycle limits must be at least 1".into()));
        }
        Ok(())
    }

    /// Configured stall limit, or one scaled to how long a paused side
    /// plausibly stays quiet.
    pub fn effective_stall_cycles(&self) -> u64 {
        self.stall_cycles.unwrap_or_else(|| {
            let scaled = (64.0 / (1.0 - self.pause_rate)).ceil() as u64;
            scaled.max(MIN_STALL_CYCLES)
        })
    }
}

/// Counters shared by the transactors and the watchdog.
#[derive(Clone, Default)]
pub struct Progress(Arc<ProgressInner>);

#[derive(Default)]
struct ProgressInner {
    cycles: AtomicU64,
    beats_in: AtomicU64,
    beats_out: AtomicU64,
    driven: AtomicU64,
    checked: AtomicU64,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }
    pub(crate) fn beat_in(&self) {
        self.0.beats_in.fetch_add(1, Ordering::Relaxed);
    }
    pub(crate) fn beat_out(&self) {
        self.0.beats_out.fetch_add(1, Ordering::Relaxed);
    }
    pub(crate) fn case_driven(&self) {
        self.0.driven.fetch_add(1, Ordering::Relaxed);
    }
    pub(crate) fn case_checked(&self) {
        self.0.checked.fetch_add(1, Ordering::Relaxed);
    }
    fn tick(&self) -> u64 {
        self.0.cycles.fetch_add(1, Ordering::Relaxed) + 1
    }
    pub fn cycles(&self) -> u64 {
        self.0.cycles.load(Ordering::Relaxed)
    }
    pub fn beats_in(&self) -> u64 {
        self.0.beats_in.load(Ordering::Relaxed)
    }
    pub fn beats_out(&self) -> u64 {
        self.0.beats_out.load(Ordering::Relaxed)
    }
    pub fn driven(&self) -> u64 {
        self.0.driven.load(Ordering::Relaxed)
    }
    pub fn checked(&self) -> u64 {
        self.0.checked.load(Ordering::Relaxed)
    }
}

/// Outcome of a passed session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport<T> {
    pub cases: u64,
    /// Rising edges from the end of reset until the last check.
    pub cycles: u64,
    pub sim_time_ns: f64,
    pub beats_in: u64,
    pub beats_out: u64,
    pub seed: u64,
    /// Checked transactions in order, empty unless recording was enabled.
    pub checked: Vec<T>,
}

/// Counts cycles and fails the run once it stops making progress or runs out
/// of cycles. Never returns `Ok`.
async fn watchdog(clk: SimObject, progress: Progress, cases: u64, stall_cycles: u64, timeout_cycles: Option<u64>) -> Result<()> {
    let mut last_beats = 0;
    let mut idle_cycles = 0;
    loop {
        clk.rising_edge().await?;
        let cycles = progress.tick();
        let beats = progress.beats_in() + progress.beats_out();
        if beats == last_beats {
            idle_cycles += 1;
        } else {
            idle_cycles = 0;
            last_beats = beats;
        }
        if timeout_cycles.is_some_and(|limit| cycles >= limit) {
            return Err(Error::Timeout {
                cycles,
                driven: progress.driven(),
                checked: progress.checked(),
                cases,
            });
        }
        if idle_cycles >= stall_cycles {
            return Err(Error::Deadlock {
                idle_cycles,
                cycles,
                driven: progress.driven(),
                checked: progress.checked(),
                cases,
            });
        }
    }
}

/// Context of a single run. Owns the reference queue and progress counters,
/// consumed by [`TestSession::run`].
pub struct TestSession<C: Codec> {
    config: SessionConfig,
    codec: Arc<C>,
    seed: u64,
    queue: ReferenceQueue<C::Item>,
    stimulus: Vec<C::Item>,
    progress: Progress,
}

impl<C: Codec> TestSession<C> {
    pub fn new(config: SessionConfig, codec: C) -> Result<Self> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(rand::random);
        let capacity = usize::try_from(config.cases)
            .map_err(|_| Error::Config(format!("{} cases do not fit in memory", config.cases)))?;
        Ok(Self {
            seed,
            codec: Arc::new(codec),
            queue: ReferenceQueue::new(capacity),
            stimulus: Vec::new(),
            progress: Progress::new(),
            config,
        })
    }

    /// Transactions driven before any generated ones, in order.
    pub fn with_stimulus(mut self, items: Vec<C::Item>) -> Result<Self> {
        if items.len() as u64 > self.config.cases {
            return Err(Error::Config(format!(
                "{} scripted transactions exceed {} cases",
                items.len(),
                self.config.cases
            )));
        }
        for item in &items {
            self.codec.validate(item)?;
        }
        self.stimulus = items;
        Ok(self)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
    pub fn seed(&self) -> u64 {
        self.seed
    }
    pub fn reference_queue(&self) -> ReferenceQueue<C::Item> {
        self.queue.clone()
    }
    pub fn progress(&self) -> Progress {
        self.progress.clone()
    }

    /// Runs the session on `dut`, which must provide `CLK`, `RST_N` and the
    /// `s_axis` and `m_axis` buses.
    pub async fn run(self, dut: SimObject) -> Result<SessionReport<C::Item>> {
        let clk = dut.c("CLK")?;
        let rst_n = dut.c("RST_N")?;
        let ingress = AxisBus::from_prefix(dut, clk, "s_axis")?;
        let egress = AxisBus::from_prefix(dut, clk, "m_axis")?;
        self.codec.check_bus(&ingress)?;
        self.codec.check_bus(&egress)?;

        tracing::info!(
            seed = self.seed,
            cases = self.config.cases,
            pause_rate = self.config.pause_rate,
            pacing = %self.config.pacing,
            "Start session"
        );
        let seed = self.seed;
        let queue = self.queue.clone();
        let mut seq = Sequencer::new(clk, rst_n, self.config.clock_period_ns);
        seq.start()?;
        let result = self.exercise(&seq, ingress, egress).await;
        seq.stop();
        match &result {
            Ok(report) => tracing::info!(cycles = report.cycles, "passed {} cases", report.cases),
            Err(e) => tracing::error!(
                seed,
                sim_time_ns = sim_if::now_ns(),
                reference = %queue.summary(),
                "{e}"
            ),
        }
        result
    }

    async fn exercise(self, seq: &Sequencer, ingress: AxisBus, egress: AxisBus) -> Result<SessionReport<C::Item>> {
        seq.reset().await?;
        let clk = seq.clk();
        let start_ns = sim_if::now_ns();
        let config = &self.config;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let pause = PauseState::new();
        let (driver_pacer, checker_pacer): (Box<dyn Pacer>, Box<dyn Pacer>) = match config.pacing {
            PacingMode::PerAttempt => (
                Box::new(BernoulliPacer::new(utils::fork_rng(&mut rng), config.pause_rate)),
                Box::new(BernoulliPacer::new(utils::fork_rng(&mut rng), config.pause_rate)),
            ),
            PacingMode::Continuous => (
                Box::new(SharedPacer::new(pause.clone(), Side::Ingress)),
                Box::new(SharedPacer::new(pause.clone(), Side::Egress)),
            ),
        };
        let record = config.record.then(|| RstbObj::new(Vec::new()));

        // the watchdog goes first so it counts an edge before anybody acts on it
        let mut handles = vec![Task::spawn_from_future(
            watchdog(
                clk,
                self.progress.clone(),
                config.cases,
                config.effective_stall_cycles(),
                config.timeout_cycles,
            ),
            "watchdog",
        )];
        if config.pacing == PacingMode::Continuous {
            handles.push(Task::spawn_from_future(
                pacing::randomizer(clk, pause, config.pause_rate, utils::fork_rng(&mut rng)),
                "randomizer",
            ));
        }
        let driver = Driver::new(
            self.codec.clone(),
            ingress,
            self.queue.clone(),
            driver_pacer,
            utils::fork_rng(&mut rng),
            config.cases,
            self.stimulus,
            self.progress.clone(),
        );
        // a finished driver has nothing to report, only its failure ends the run
        handles.push(Task::spawn_from_future(
            async move {
                driver.run().await?;
                future::pending::<()>().await;
                Ok(())
            },
            "driver",
        ));
        let checker = Checker::new(
            self.codec.clone(),
            egress,
            self.queue.clone(),
            checker_pacer,
            config.pacing,
            config.cases,
            self.progress.clone(),
            record.clone(),
        );
        handles.push(Task::spawn_from_future(checker.run(), "checker"));

        let (result, _, rest) = future::select_all(handles).await;
        for handle in rest {
            handle.cancel();
        }
        result?;

        Ok(SessionReport {
            cases: config.cases,
            cycles: self.progress.cycles(),
            sim_time_ns: sim_if::now_ns() - start_ns,
            beats_in: self.progress.beats_in(),
            beats_out: self.progress.beats_out(),
            seed: self.seed,
            checked: record.map(|r| std::mem::take(&mut *r.get())).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Frame, FrameCodec};
    use rstest::rstest;

    #[rstest]
    #[case(SessionConfig::default().cases(0))]
    #[case(SessionConfig::default().pause_rate(1.0))]
    #[case(SessionConfig::default().pause_rate(-0.1))]
    #[case(SessionConfig::default().clock_period_ns(0))]
    #[case(SessionConfig::default().stall_cycles(0))]
    #[case(SessionConfig::default().timeout_cycles(0))]
    fn rejects_invalid_config(#[case] config: SessionConfig) {
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[rstest]
    #[case(0.0, 1024)]
    #[case(0.5, 1024)]
    #[case(0.99, 6400)]
    fn stall_limit_scales_with_pause_rate(#[case] rate: f64, #[case] expected: u64) {
        let config = SessionConfig::default().pause_rate(rate);
        assert_eq!(config.effective_stall_cycles(), expected);
        assert_eq!(config.stall_cycles(7).effective_stall_cycles(), 7);
    }

    #[test]
    fn stimulus_longer_than_cases_is_rejected() {
        let codec = crate::codec::WordCodec::new(8).unwrap();
        let session = TestSession::new(SessionConfig::default().cases(1).seed(1), codec).unwrap();
        let items = vec![crate::value::LogicVec::from_u64(8, 1); 2];
        assert!(matches!(session.with_stimulus(items), Err(Error::Config(_))));
    }

    #[rstest]
    #[case(Frame::default())]
    #[case(Frame::new([0; 5]))]
    fn out_of_range_frames_are_rejected(#[case] frame: Frame) {
        let codec = FrameCodec::new(4, 2).unwrap();
        let session = TestSession::new(SessionConfig::default().cases(2).seed(1), codec).unwrap();
        let items = vec![Frame::new([1, 2]), frame];
        assert!(matches!(session.with_stimulus(items), Err(Error::Config(_))));
    }

    #[test]
    fn words_of_the_wrong_width_are_rejected() {
        let codec = crate::codec::WordCodec::new(8).unwrap();
        let session = TestSession::new(SessionConfig::default().cases(1).seed(1), codec).unwrap();
        let items = vec![crate::value::LogicVec::from_u64(16, 1)];
        assert!(matches!(session.with_stimulus(items), Err(Error::Config(_))));
    }

    #[test]
    fn configured_seed_is_kept() {
        let codec = crate::codec::WordCodec::new(8).unwrap();
        let session = TestSession::new(SessionConfig::default().seed(42), codec).unwrap();
        assert_eq!(session.seed(), 42);
    }
}
