pub use crate::axis::{AxisBus, Beat, HandshakePins};
pub use crate::codec::{Codec, Frame, FrameCodec, Transaction, WordCodec};
pub use crate::error::{Error, ErrorKind, Result, SimError, Violation};
pub use crate::executor::{JoinHandle, Task};
pub use crate::fifo::{AxisFifo, Fault, FifoConfig};
pub use crate::native::Simulator;
pub use crate::pacing::PacingMode;
pub use crate::rstb_obj::RstbObj;
pub use crate::scoreboard::ReferenceQueue;
pub use crate::session::{SessionConfig, SessionReport, TestSession};
pub use crate::signal::SimObject;
pub use crate::trigger::Trigger;
pub use crate::value::LogicVec;
pub use futures::future::FutureExt;
