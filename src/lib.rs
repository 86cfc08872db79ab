//! Deadlock and ordering stress testbench for valid/ready stream interfaces.
//!
//! A [`session::TestSession`] drives random transactions into the `s_axis`
//! side of a device, applies random backpressure on both sides and checks the
//! `m_axis` side against a reference queue. Everything runs on a small
//! single threaded async executor on top of a simulator reached through
//! [`sim_if::SimIf`]. [`native::Simulator`] evaluates behavioral devices such
//! as [`fifo::AxisFifo`] in process.

pub mod axis;
pub mod checker;
pub mod codec;
pub mod device;
pub mod driver;
pub mod error;
mod executor;
pub mod fifo;
pub mod junit;
pub mod native;
pub mod pacing;
pub mod prelude;
pub mod report;
mod rstb_obj;
pub mod scoreboard;
pub mod session;
mod signal;
pub mod sim_if;
pub mod test;
pub mod testbench;
mod trigger;
pub mod utils;
mod value;

pub use error::{Error, ErrorKind, Result};
pub use executor::{JoinHandle, Task};
pub use rstb_obj::RstbObj;
pub use signal::SimObject;
pub use trigger::Trigger;
pub use value::LogicVec;
