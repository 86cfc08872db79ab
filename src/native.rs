//! In-process event driven simulator evaluating a behavioral [`Device`].
//!
//! Writes are inertial: they are queued and applied together at the end of the
//! current delta cycle. At a rising edge of the device clock the device is
//! evaluated first, then the edge waiters run, so both see the values the
//! design had at the edge.

use intmap::IntMap;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::rc::Rc;

use crate::device::{Device, Pins};
use crate::error::{Error, Result, SimError};
use crate::executor::{self, Task};
use crate::rstb_obj::RstbObj;
use crate::signal::SimObject;
use crate::sim_if::{self, ObjectKind, SimCallback, SimIf, SimResult};
use crate::trigger::{self, EdgeKind};
use crate::value::LogicVec;

const MAX_DELTAS: u32 = 1000;
const ROOT_HANDLE: usize = 0;

enum CbKind {
    Time(u64),
    Edge(usize),
}

struct Object {
    name: String,
    kind: ObjectKind,
    value: LogicVec,
}

struct KernelState {
    time: u64,
    objects: Vec<Object>,
    names: HashMap<String, usize>,
    pending: Vec<(usize, LogicVec)>,
    // absolute time -> callback handles
    timers: BTreeMap<u64, Vec<usize>>,
    callbacks: IntMap<CbKind>,
    // signal handle -> callback handle
    edge_watch: IntMap<usize>,
    next_cb: usize,
    // port index -> signal handle
    ports: Vec<usize>,
    clock: usize,
}

pub(crate) struct NativeSim {
    state: RefCell<KernelState>,
    device: RefCell<Box<dyn Device>>,
    precision: i8,
    max_steps: Cell<Option<u64>>,
}

impl NativeSim {
    fn new(device: Box<dyn Device>, precision: i8) -> Self {
        let top = device.name().to_string();
        let mut objects = vec![Object {
            name: top.clone(),
            kind: ObjectKind::Scope,
            value: LogicVec::zero(0),
        }];
        let mut ports = Vec::new();
        for port in device.ports() {
            ports.push(objects.len());
            objects.push(Object {
                name: format!("{}.{}", top, port.name),
                kind: ObjectKind::Vector(port.width),
                value: LogicVec::zero(port.width),
            });
        }
        let names = objects
            .iter()
            .enumerate()
            .map(|(handle, obj)| (obj.name.clone(), handle))
            .collect();
        let clock = ports.get(device.clock()).copied().unwrap_or(ROOT_HANDLE);
        Self {
            state: RefCell::new(KernelState {
                time: 0,
                objects,
                names,
                pending: Vec::new(),
                timers: BTreeMap::new(),
                callbacks: IntMap::new(),
                edge_watch: IntMap::new(),
                next_cb: 1,
                ports,
                clock,
            }),
            device: RefCell::new(device),
            precision,
            max_steps: Cell::new(None),
        }
    }

    fn run_until(&self, done: impl Fn() -> bool) -> SimResult<()> {
        self.settle()?;
        while !done() {
            let next = self.state.borrow().timers.keys().next().copied();
            let Some(t) = next else {
                return Err(SimError::Stalled(self.get_sim_time_steps()));
            };
            if self.max_steps.get().is_some_and(|max| t > max) {
                return Err(SimError::TimeLimit(t));
            }
            let handles = {
                let mut state = self.state.borrow_mut();
                state.time = t;
                state.timers.remove(&t).unwrap_or_default()
            };
            for handle in handles {
                let live = self.state.borrow_mut().callbacks.remove(handle as u64).is_some();
                if live {
                    trigger::react(SimCallback::Time(t), EdgeKind::Any);
                }
            }
            self.settle()?;
        }
        Ok(())
    }

    fn settle(&self) -> SimResult<()> {
        let mut deltas = 0;
        loop {
            let writes = std::mem::take(&mut self.state.borrow_mut().pending);
            if writes.is_empty() {
                return Ok(());
            }
            deltas += 1;
            if deltas > MAX_DELTAS {
                return Err(SimError::DeltaOverflow(MAX_DELTAS));
            }

            let (changes, clock_rose) = {
                let mut state = self.state.borrow_mut();
                let mut old: Vec<(usize, LogicVec)> = Vec::new();
                for (handle, value) in writes {
                    let obj = &mut state.objects[handle];
                    if !old.iter().any(|(h, _)| *h == handle) {
                        old.push((handle, obj.value.clone()));
                    }
                    obj.value = value;
                }
                let changes: Vec<(usize, EdgeKind)> = old
                    .into_iter()
                    .filter_map(|(handle, before)| {
                        let after = &state.objects[handle].value;
                        (*after != before).then(|| (handle, edge_kind(&before, after)))
                    })
                    .collect();
                let clock = state.clock;
                let clock_rose = changes.iter().any(|(h, e)| *h == clock && *e == EdgeKind::Rising);
                (changes, clock_rose)
            };

            if clock_rose {
                self.eval_device();
            }
            for (handle, edge) in changes {
                let watched = self.state.borrow().edge_watch.contains_key(handle as u64);
                if watched {
                    trigger::react(SimCallback::Edge(handle), edge);
                }
            }
        }
    }

    fn eval_device(&self) {
        let values: Vec<LogicVec> = {
            let state = self.state.borrow();
            state.ports.iter().map(|h| state.objects[*h].value.clone()).collect()
        };
        let writes = {
            let mut device = self.device.borrow_mut();
            let mut pins = Pins::new(&values);
            device.on_rising_edge(&mut pins);
            pins.into_writes()
        };
        let mut state = self.state.borrow_mut();
        for (port, value) in writes {
            let Some(&handle) = state.ports.get(port) else {
                tracing::warn!(port, "device wrote to an unknown port");
                continue;
            };
            let width = state.objects[handle].value.width();
            let value = match value.width() == width {
                true => value,
                false => LogicVec::from_bytes(width, value.as_bytes()),
            };
            state.pending.push((handle, value));
        }
    }

    fn vector(&self, handle: usize) -> SimResult<u32> {
        let state = self.state.borrow();
        let obj = state.objects.get(handle).ok_or(SimError::InvalidHandle(handle))?;
        match obj.kind {
            ObjectKind::Vector(width) => Ok(width),
            ObjectKind::Scope => Err(SimError::NotAVector(obj.name.clone())),
        }
    }
}

fn edge_kind(before: &LogicVec, after: &LogicVec) -> EdgeKind {
    if after.width() != 1 {
        return EdgeKind::Any;
    }
    match (before.bit(0), after.bit(0)) {
        (false, true) => EdgeKind::Rising,
        (true, false) => EdgeKind::Falling,
        _ => EdgeKind::Any,
    }
}

impl SimIf for NativeSim {
    fn set_value(&self, handle: usize, value: LogicVec) -> SimResult<()> {
        let width = self.vector(handle)?;
        if value.width() != width {
            return Err(SimError::WidthMismatch {
                name: self.get_full_name(handle)?,
                width,
                got: value.width(),
            });
        }
        self.state.borrow_mut().pending.push((handle, value));
        Ok(())
    }
    fn get_value(&self, handle: usize) -> SimResult<LogicVec> {
        self.vector(handle)?;
        Ok(self.state.borrow().objects[handle].value.clone())
    }
    fn get_handle_by_name(&self, name: &str) -> SimResult<usize> {
        self.state
            .borrow()
            .names
            .get(name)
            .copied()
            .ok_or_else(|| SimError::UnknownObject(name.to_string()))
    }
    fn get_kind(&self, handle: usize) -> SimResult<ObjectKind> {
        let state = self.state.borrow();
        let obj = state.objects.get(handle).ok_or(SimError::InvalidHandle(handle))?;
        Ok(obj.kind)
    }
    fn get_full_name(&self, handle: usize) -> SimResult<String> {
        let state = self.state.borrow();
        let obj = state.objects.get(handle).ok_or(SimError::InvalidHandle(handle))?;
        Ok(obj.name.clone())
    }
    fn get_root_handle(&self) -> SimResult<usize> {
        Ok(ROOT_HANDLE)
    }
    fn get_sim_time_steps(&self) -> u64 {
        self.state.borrow().time
    }
    fn get_sim_precision(&self) -> i8 {
        self.precision
    }
    fn register_callback(&self, cb: SimCallback) -> SimResult<usize> {
        if let SimCallback::Edge(sig_hdl) = cb {
            self.vector(sig_hdl)?;
        }
        let mut state = self.state.borrow_mut();
        let cb_hdl = state.next_cb;
        state.next_cb += 1;
        match cb {
            SimCallback::Time(t) => {
                let t_abs = t + state.time;
                state.timers.entry(t_abs).or_default().push(cb_hdl);
                state.callbacks.insert(cb_hdl as u64, CbKind::Time(t_abs));
            }
            SimCallback::Edge(sig_hdl) => {
                state.edge_watch.insert(sig_hdl as u64, cb_hdl);
                state.callbacks.insert(cb_hdl as u64, CbKind::Edge(sig_hdl));
            }
        }
        Ok(cb_hdl)
    }
    fn cancel_callback(&self, cb_hdl: usize) -> SimResult<()> {
        let mut state = self.state.borrow_mut();
        let cb = state
            .callbacks
            .remove(cb_hdl as u64)
            .ok_or(SimError::UnknownCallback(cb_hdl))?;
        match cb {
            CbKind::Time(t_abs) => {
                if let Some(handles) = state.timers.get_mut(&t_abs) {
                    handles.retain(|h| *h != cb_hdl);
                    if handles.is_empty() {
                        state.timers.remove(&t_abs);
                    }
                }
            }
            CbKind::Edge(sig_hdl) => {
                if state.edge_watch.get(sig_hdl as u64) == Some(&cb_hdl) {
                    state.edge_watch.remove(sig_hdl as u64);
                }
            }
        }
        Ok(())
    }
}

/// Runs one test against a fresh instance of a device.
pub struct Simulator {
    device: Box<dyn Device>,
    precision: i8,
    max_time_ns: Option<u64>,
}

impl Simulator {
    pub fn new(device: impl Device + 'static) -> Self {
        Self {
            device: Box::new(device),
            precision: -12,
            max_time_ns: None,
        }
    }

    /// Simulation step as power of ten seconds, -12 (1 ps) by default.
    pub fn precision(mut self, precision: i8) -> Self {
        self.precision = precision;
        self
    }

    /// Hard stop for the simulation, independent of any harness watchdog.
    pub fn max_time_ns(mut self, ns: u64) -> Self {
        self.max_time_ns = Some(ns);
        self
    }

    /// Runs `test` with the toplevel scope until it returns. Fails if the
    /// simulation runs out of events or time before that.
    pub fn run<T, F, Fut>(self, test: F) -> Result<T>
    where
        F: FnOnce(SimObject) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let sim = Rc::new(NativeSim::new(self.device, self.precision));
        sim_if::install(sim.clone())?;
        let _teardown = Teardown;

        if let Some(ns) = self.max_time_ns {
            sim.max_steps.set(Some(sim.get_sim_steps(ns as f64, "ns")?));
        }
        let root = SimObject::get_root()?;
        let slot: RstbObj<Option<Result<T>>> = RstbObj::new(None);
        let out = slot.clone();
        let fut = test(root);
        Task::spawn_from_future(
            async move {
                let result = fut.await;
                out.with_mut(|s| *s = Some(result));
                Ok(())
            },
            "test",
        );
        // first simulation tick
        executor::run_once();
        let run = sim.run_until(|| slot.get().is_some());

        match (slot.with_mut(|s| s.take()), run) {
            (Some(result), _) => result,
            (None, Err(e)) => Err(e.into()),
            (None, Ok(())) => Err(Error::Cancelled),
        }
    }
}

struct Teardown;

impl Drop for Teardown {
    fn drop(&mut self) {
        trigger::cancel_all_triggers();
        executor::clear_ready_queue();
        sim_if::uninstall();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::PortDecl;
    use crate::trigger::Trigger;
    use crate::utils::clock_cycles;

    /// Counter register: q <= q + 1 every edge, d is a plain input.
    struct Counter {
        q: u64,
    }

    impl Device for Counter {
        fn name(&self) -> &str {
            "top"
        }
        fn ports(&self) -> Vec<PortDecl> {
            vec![PortDecl::input("clk", 1), PortDecl::input("d", 8), PortDecl::output("q", 8)]
        }
        fn clock(&self) -> usize {
            0
        }
        fn on_rising_edge(&mut self, pins: &mut Pins<'_>) {
            self.q = self.q.wrapping_add(1) & 0xff;
            pins.write(2, LogicVec::from_u64(8, self.q));
        }
    }

    async fn toggle(clk: SimObject, half_ns: u64) -> Result<()> {
        loop {
            clk.set_bool(true)?;
            Trigger::timer(half_ns, "ns")?.await?;
            clk.set_bool(false)?;
            Trigger::timer(half_ns, "ns")?.await?;
        }
    }

    #[test]
    fn writes_are_visible_after_the_delta() {
        let seen = Simulator::new(Counter { q: 0 })
            .run(|dut| async move {
                let d = dut.c("d")?;
                d.set_u64(0x5a)?;
                let before = d.u64()?;
                Trigger::timer(1, "ns")?.await?;
                Ok((before, d.u64()?))
            })
            .unwrap();
        assert_eq!(seen, (0, 0x5a));
    }

    #[test]
    fn edge_waiters_see_pre_edge_register_values() {
        let seen = Simulator::new(Counter { q: 0 })
            .run(|dut| async move {
                let clk = dut.c("clk")?;
                let q = dut.c("q")?;
                Task::fork(toggle(clk, 5));
                let mut seen = Vec::new();
                for _ in 0..3 {
                    clk.rising_edge().await?;
                    seen.push(q.u64()?);
                }
                clk.falling_edge().await?;
                seen.push(q.u64()?);
                Ok(seen)
            })
            .unwrap();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn stuck_clock_stalls() {
        let err = Simulator::new(Counter { q: 0 })
            .run(|dut| async move {
                let clk = dut.c("clk")?;
                clock_cycles(clk, 2).await
            })
            .unwrap_err();
        assert!(matches!(err, Error::Sim(SimError::Stalled(_))));
    }

    #[test]
    fn max_time_stops_runaway_tests() {
        let err = Simulator::new(Counter { q: 0 })
            .max_time_ns(100)
            .run(|dut| async move {
                let clk = dut.c("clk")?;
                Task::fork(toggle(clk, 5));
                clock_cycles(clk, 1000).await
            })
            .unwrap_err();
        assert!(matches!(err, Error::Sim(SimError::TimeLimit(_))));
    }

    #[test]
    fn rejects_bad_writes_and_names() {
        Simulator::new(Counter { q: 0 })
            .run(|dut| async move {
                assert!(matches!(dut.c("nope"), Err(Error::Sim(SimError::UnknownObject(_)))));
                let d = dut.c("d")?;
                let err = d.set(LogicVec::from_u64(4, 1)).unwrap_err();
                assert!(matches!(err, Error::Sim(SimError::WidthMismatch { width: 8, got: 4, .. })));
                Ok(())
            })
            .unwrap();
        assert!(!sim_if::is_running());
    }
}
