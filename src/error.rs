use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every way a session, or the simulation underneath it, can fail.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("case {case}: dut and reference are inconsistent (expected {expected}, received {received})")]
    DataMismatch {
        case: u64,
        expected: String,
        received: String,
    },
    #[error(
        "deadlock: no handshake for {idle_cycles} cycles after {cycles} cycles \
         (driven {driven}/{cases}, checked {checked}/{cases})"
    )]
    Deadlock {
        idle_cycles: u64,
        cycles: u64,
        driven: u64,
        checked: u64,
        cases: u64,
    },
    #[error("timeout after {cycles} cycles (driven {driven}/{cases}, checked {checked}/{cases})")]
    Timeout {
        cycles: u64,
        driven: u64,
        checked: u64,
        cases: u64,
    },
    #[error("protocol violation: {0}")]
    Protocol(#[from] Violation),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("simulation error: {0}")]
    Sim(#[from] SimError),
    #[error("awaited task was cancelled")]
    Cancelled,
    #[error("could not write report: {0}")]
    Report(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Violation {
    #[error("reference queue underflow at case {case}: checker is ahead of driver")]
    QueueUnderflow { case: u64 },
    #[error("reference queue overflow: capacity is {capacity}")]
    QueueOverflow { capacity: usize },
    #[error("{side} valid dropped before beat {beat} was accepted")]
    ValidDropped { side: &'static str, beat: u64 },
    #[error("{side} data changed before beat {beat} was accepted: held {held}, now {observed}")]
    DataChanged {
        side: &'static str,
        beat: u64,
        held: String,
        observed: String,
    },
    #[error("clock was already started")]
    ClockAlreadyStarted,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("no simulator is running on this thread")]
    NoSimulator,
    #[error("a simulator is already running on this thread")]
    AlreadyRunning,
    #[error("could not find object {0}")]
    UnknownObject(String),
    #[error("invalid object handle {0}")]
    InvalidHandle(usize),
    #[error("{0} has no value")]
    NotAVector(String),
    #[error("can't set {name} ({width} bits) to a {got} bit value")]
    WidthMismatch { name: String, width: u32, got: u32 },
    #[error("unknown time unit {0:?}")]
    UnknownTimeUnit(String),
    #[error("can't convert {time} {unit} to sim steps without rounding")]
    TimeRounding { time: f64, unit: String },
    #[error("no callback with handle {0}")]
    UnknownCallback(usize),
    #[error("more than {0} delta cycles in one time step")]
    DeltaOverflow(u32),
    #[error("simulation stalled at step {0}: no pending events")]
    Stalled(u64),
    #[error("simulation time limit reached at step {0}")]
    TimeLimit(u64),
}

/// Coarse classification used by reports and the CLI exit path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DataMismatch,
    Deadlock,
    ProtocolViolation,
    Configuration,
    Simulation,
    Report,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DataMismatch { .. } => ErrorKind::DataMismatch,
            Error::Deadlock { .. } | Error::Timeout { .. } => ErrorKind::Deadlock,
            Error::Protocol(_) => ErrorKind::ProtocolViolation,
            Error::Config(_) => ErrorKind::Configuration,
            Error::Sim(_) | Error::Cancelled => ErrorKind::Simulation,
            Error::Report(_) => ErrorKind::Report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_failures_share_a_kind() {
        let deadlock = Error::Deadlock { idle_cycles: 10, cycles: 20, driven: 1, checked: 0, cases: 2 };
        let timeout = Error::Timeout { cycles: 20, driven: 1, checked: 0, cases: 2 };
        assert_eq!(deadlock.kind(), ErrorKind::Deadlock);
        assert_eq!(timeout.kind(), ErrorKind::Deadlock);
    }

    #[test]
    fn mismatch_message_carries_both_values() {
        let err = Error::DataMismatch { case: 3, expected: "0x12".into(), received: "0x13".into() };
        let msg = err.to_string();
        assert!(msg.contains("0x12") && msg.contains("0x13"));
        assert!(msg.starts_with("case 3"));
    }
}
