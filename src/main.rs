use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use rstb_axis::junit;
use rstb_axis::prelude::*;
use rstb_axis::report;
use rstb_axis::test::RstbTests;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Variant {
    /// One fixed width word per beat.
    Word,
    /// Variable length frames with tkeep and tlast.
    Frame,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Pacing {
    PerAttempt,
    Continuous,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FaultKind {
    None,
    Corrupt,
    Drop,
    Wedge,
    Glitch,
}

/// Stress a behavioral AXI-Stream FIFO with random traffic and backpressure.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long, value_enum, default_value = "word")]
    variant: Variant,

    /// Defaults to per-attempt for words and continuous for frames.
    #[arg(long, value_enum)]
    pacing: Option<Pacing>,

    /// Number of transactions to check
    #[arg(long, default_value_t = 2000)]
    cases: u64,

    /// Probability of holding back valid or ready, in [0, 1)
    #[arg(long, default_value_t = 0.5)]
    pause_rate: f64,

    /// Word width in bits
    #[arg(long, default_value_t = 256)]
    data_width: u32,

    /// Longest frame in bytes
    #[arg(long, default_value_t = 128)]
    payload_max: usize,

    /// Frame bus width in bytes
    #[arg(long, default_value_t = 32)]
    bus_bytes: u32,

    #[arg(long, default_value_t = 16)]
    fifo_depth: usize,

    /// Misbehavior to inject into the FIFO
    #[arg(long, value_enum, default_value = "none")]
    fault: FaultKind,

    /// Beat the fault applies to
    #[arg(long, default_value_t = 0)]
    fault_beat: u64,

    /// Random seed, drawn from the OS if not given
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    timeout_cycles: Option<u64>,

    #[arg(long)]
    stall_cycles: Option<u64>,

    #[arg(long, default_value_t = 10)]
    clock_period_ns: u64,

    /// Write a JUnit XML report to this path
    #[arg(long)]
    junit: Option<PathBuf>,
}

impl Cli {
    fn fault(&self) -> Fault {
        let beat = self.fault_beat;
        match self.fault {
            FaultKind::None => Fault::None,
            FaultKind::Corrupt => Fault::Corrupt { beat },
            FaultKind::Drop => Fault::Drop { beat },
            FaultKind::Wedge => Fault::WedgeWhenFull,
            FaultKind::Glitch => Fault::Glitch { beat },
        }
    }

    fn session_config(&self) -> SessionConfig {
        let pacing = match (self.pacing, self.variant) {
            (Some(Pacing::PerAttempt), _) | (None, Variant::Word) => PacingMode::PerAttempt,
            (Some(Pacing::Continuous), _) | (None, Variant::Frame) => PacingMode::Continuous,
        };
        SessionConfig {
            cases: self.cases,
            pause_rate: self.pause_rate,
            pacing,
            clock_period_ns: self.clock_period_ns,
            timeout_cycles: self.timeout_cycles,
            stall_cycles: self.stall_cycles,
            seed: self.seed,
            record: false,
        }
    }
}

fn run_session<C: Codec>(fifo: Result<AxisFifo>, config: SessionConfig, codec: Result<C>) -> Result<SessionReport<C::Item>> {
    let session = TestSession::new(config, codec?)?;
    Simulator::new(fifo?).run(move |dut| session.run(dut))
}

fn outcome<T>(result: Result<SessionReport<T>>) -> (Result<String>, f64, u64) {
    match result {
        Ok(r) => (
            Ok(format!("passed {} cases (seed {})", r.cases, r.seed)),
            r.sim_time_ns,
            r.cycles,
        ),
        Err(e) => (Err(e), 0.0, 0),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();
    let config = cli.session_config();
    let name = format!("{:?}_{}", cli.variant, config.pacing).to_lowercase();

    let mut tests = RstbTests::new();
    let test = tests.run(&name, || match cli.variant {
        Variant::Word => outcome(run_session(
            AxisFifo::new(FifoConfig::word(cli.data_width, cli.fifo_depth).fault(cli.fault())),
            config,
            WordCodec::new(cli.data_width),
        )),
        Variant::Frame => outcome(run_session(
            AxisFifo::new(FifoConfig::frame(cli.bus_bytes, cli.fifo_depth).fault(cli.fault())),
            config,
            FrameCodec::new(cli.payload_max, cli.bus_bytes as usize),
        )),
    });
    match &test.result {
        Ok(msg) => println!("{msg}"),
        Err(e) => println!("failed: {e}"),
    }

    report::summary_table(&tests).printstd();
    if let Some(path) = &cli.junit {
        if let Err(e) = junit::create_junit_xml(env!("CARGO_PKG_NAME"), &tests, path) {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    }
    match tests.all_passed() {
        true => ExitCode::SUCCESS,
        false => ExitCode::FAILURE,
    }
}
