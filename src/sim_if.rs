use std::cell::RefCell;
use std::rc::Rc;

use crate::error::SimError;
use crate::value::LogicVec;

pub type SimResult<T> = std::result::Result<T, SimError>;

thread_local! {
    static SIM_IF: RefCell<Option<Rc<dyn SimIf>>> = const { RefCell::new(None) };
}

/// Simulator running on this thread.
pub fn current() -> SimResult<Rc<dyn SimIf>> {
    SIM_IF.with(|s| s.borrow().clone()).ok_or(SimError::NoSimulator)
}

pub fn is_running() -> bool {
    SIM_IF.with(|s| s.borrow().is_some())
}

pub(crate) fn install(sim: Rc<dyn SimIf>) -> SimResult<()> {
    SIM_IF.with(|s| {
        let mut slot = s.borrow_mut();
        if slot.is_some() {
            return Err(SimError::AlreadyRunning);
        }
        *slot = Some(sim);
        Ok(())
    })
}

pub(crate) fn uninstall() {
    SIM_IF.with(|s| s.borrow_mut().take());
}

/// Current simulation time in ns, 0 outside of a simulation. Used as a log field.
pub fn now_ns() -> f64 {
    current().map(|sim| sim.get_sim_time("ns")).unwrap_or(0.0)
}

#[derive(Debug, Hash, Clone, Copy, Eq, PartialEq)]
pub enum SimCallback {
    /// Relative delay in sim steps when registering, absolute time when reacting.
    Time(u64),
    Edge(usize),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Scope,
    Vector(u32),
}

pub trait SimIf {
    /// Inertial write, visible once the current delta cycle is over.
    fn set_value(&self, handle: usize, value: LogicVec) -> SimResult<()>;
    fn get_value(&self, handle: usize) -> SimResult<LogicVec>;
    fn get_handle_by_name(&self, name: &str) -> SimResult<usize>;
    fn get_kind(&self, handle: usize) -> SimResult<ObjectKind>;
    fn get_full_name(&self, handle: usize) -> SimResult<String>;
    fn get_root_handle(&self) -> SimResult<usize>;
    fn get_sim_time_steps(&self) -> u64;
    fn get_sim_precision(&self) -> i8;
    fn register_callback(&self, cb: SimCallback) -> SimResult<usize>;
    fn cancel_callback(&self, cb_hdl: usize) -> SimResult<()>;

    fn log(&self, msg: &str) {
        tracing::info!(sim_time_ns = self.get_sim_time("ns"), "{}", msg);
    }
    fn get_sim_time(&self, unit: &str) -> f64 {
        // this function does not preserve precision, so don't use carelessly
        let t = self.get_sim_time_steps() as f64;
        let precision = self.get_sim_precision();
        match time_scale(unit) {
            Ok(scale) => ldexp10(t, precision - scale),
            Err(_) => t,
        }
    }
    fn get_sim_steps(&self, time: f64, unit: &str) -> SimResult<u64> {
        let precision = self.get_sim_precision();
        let steps = ldexp10(time, time_scale(unit)? - precision);
        if steps % 1.0 == 0.0 && steps >= 0.0 {
            Ok(steps as u64)
        } else {
            Err(SimError::TimeRounding {
                time,
                unit: unit.to_string(),
            })
        }
    }
}

pub(crate) fn time_scale(unit: &str) -> SimResult<i8> {
    match unit {
        "fs" => Ok(-15),
        "ps" => Ok(-12),
        "ns" => Ok(-9),
        "us" => Ok(-6),
        "ms" => Ok(-3),
        "sec" => Ok(0),
        _ => Err(SimError::UnknownTimeUnit(unit.to_string())),
    }
}

fn ldexp10(frac: f64, exp: i8) -> f64 {
    // Like math.ldexp, but base 10
    if exp >= 0 {
        frac * 10_u64.pow(exp as u32) as f64
    } else {
        let div = 10_u64.pow(-exp as u32) as f64;
        frac / div
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ldexp10_scales_both_ways() {
        assert_eq!(ldexp10(5.0, 3), 5000.0);
        assert_eq!(ldexp10(5000.0, -3), 5.0);
    }

    #[test]
    fn unknown_units_are_rejected() {
        assert_eq!(time_scale("ns"), Ok(-9));
        assert_eq!(time_scale("minutes"), Err(SimError::UnknownTimeUnit("minutes".into())));
    }

    #[test]
    fn no_simulator_outside_of_a_run() {
        assert!(!is_running());
        assert!(matches!(current(), Err(SimError::NoSimulator)));
        assert_eq!(now_ns(), 0.0);
    }
}
