use intmap::IntMap;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use crate::error::{Result, SimError};
use crate::executor;
use crate::signal::SimObject;
use crate::sim_if::{self, SimCallback};

// IntMap specializes on u64 keys and doesn't need to hash them.
thread_local! {
    // key is signal handle
    static EDGE_MAP: RefCell<IntMap<CallbackHandles>> = RefCell::new(IntMap::new());
    // key is absolute callback time
    static TIMER_MAP: RefCell<IntMap<CallbackHandles>> = RefCell::new(IntMap::new());
}

struct CallbackHandles {
    handle: usize,
    callbacks: VecDeque<TrigShared>,
}

#[derive(PartialEq, Clone, Copy, Debug)]
pub enum EdgeKind {
    Any,
    Rising,
    Falling,
}

/// Drops every pending trigger. Tasks waiting on them are never woken again.
pub(crate) fn cancel_all_triggers() {
    let mut handles: Vec<usize> = Vec::new();
    TIMER_MAP.with(|m| handles.extend(m.borrow_mut().drain().map(|(_, cb)| cb.handle)));
    EDGE_MAP.with(|m| handles.extend(m.borrow_mut().drain().map(|(_, cb)| cb.handle)));
    // without a simulator there is nothing left to unregister from
    if let Ok(sim) = sim_if::current() {
        for handle in handles {
            let _ = sim.cancel_callback(handle);
        }
    }
}

#[derive(Debug, Clone)]
struct TrigShared {
    waker: Waker,
    fired: Arc<AtomicBool>,
    // If trigger is an edge, react needs to know if it is a rising or falling edge
    // so an existing callback does not have to be rescheduled.
    edge_kind: EdgeKind,
}

impl TrigShared {
    fn wake(self) {
        self.fired.store(true, Ordering::Release);
        self.waker.wake();
    }
}

#[derive(Clone, Copy, Debug)]
pub enum TrigKind {
    Edge(usize, EdgeKind),
    Timer(u64),
}

/// A future completing once a simulator event has happened.
///
/// A trigger registers itself on the first poll and is ready on the first poll
/// after its event fired, so a task awaiting it may be polled spuriously.
pub struct Trigger {
    kind: TrigKind,
    fired: Option<Arc<AtomicBool>>,
}

impl Trigger {
    pub fn timer(time: u64, unit: &str) -> Result<Self> {
        let steps = sim_if::current()?.get_sim_steps(time as f64, unit)?;
        Ok(Self::timer_steps(steps))
    }
    pub fn timer_steps(steps: u64) -> Self {
        Self::new(TrigKind::Timer(steps))
    }
    pub fn edge(signal: SimObject) -> Self {
        Self::new(TrigKind::Edge(signal.handle(), EdgeKind::Any))
    }
    pub fn rising_edge(signal: SimObject) -> Self {
        Self::new(TrigKind::Edge(signal.handle(), EdgeKind::Rising))
    }
    pub fn falling_edge(signal: SimObject) -> Self {
        Self::new(TrigKind::Edge(signal.handle(), EdgeKind::Falling))
    }
    fn new(kind: TrigKind) -> Self {
        Trigger { kind, fired: None }
    }

    fn register(&self, shared: TrigShared) -> std::result::Result<(), SimError> {
        let sim = sim_if::current()?;
        match self.kind {
            TrigKind::Timer(t) => {
                // Add current time to key since the simulator reacts with absolute time
                let abs_time = t + sim.get_sim_time_steps();
                let exists = TIMER_MAP.with(|m| {
                    m.borrow_mut()
                        .get_mut(abs_time)
                        .map(|cbs| cbs.callbacks.push_back(shared.clone()))
                        .is_some()
                });
                if !exists {
                    let handle = sim.register_callback(SimCallback::Time(t))?;
                    TIMER_MAP.with(|m| {
                        m.borrow_mut().insert(
                            abs_time,
                            CallbackHandles { handle, callbacks: VecDeque::from([shared]) },
                        )
                    });
                }
            }
            TrigKind::Edge(sig_hdl, edge_kind) => {
                let shared = TrigShared { edge_kind, ..shared };
                let exists = EDGE_MAP.with(|m| {
                    m.borrow_mut()
                        .get_mut(sig_hdl as u64)
                        .map(|cbs| cbs.callbacks.push_back(shared.clone()))
                        .is_some()
                });
                if !exists {
                    let handle = sim.register_callback(SimCallback::Edge(sig_hdl))?;
                    EDGE_MAP.with(|m| {
                        m.borrow_mut().insert(
                            sig_hdl as u64,
                            CallbackHandles { handle, callbacks: VecDeque::from([shared]) },
                        )
                    });
                }
            }
        }
        Ok(())
    }
}

impl Future for Trigger {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(fired) = &self.fired {
            return match fired.load(Ordering::Acquire) {
                true => Poll::Ready(Ok(())),
                false => Poll::Pending,
            };
        }
        let fired = Arc::new(AtomicBool::new(false));
        let shared = TrigShared {
            waker: cx.waker().clone(),
            fired: fired.clone(),
            edge_kind: EdgeKind::Any,
        };
        if let Err(e) = self.register(shared) {
            return Poll::Ready(Err(e.into()));
        }
        self.fired = Some(fired);
        Poll::Pending
    }
}

/// Called by the simulator whenever a registered callback fires.
#[inline]
pub fn react(cb: SimCallback, edge: EdgeKind) {
    let mut wake: VecDeque<TrigShared> = VecDeque::new();
    let mut cancel = None;

    match cb {
        SimCallback::Time(t) => {
            match TIMER_MAP.with(|m| m.borrow_mut().remove(t)) {
                Some(callbacks) => wake = callbacks.callbacks,
                None => tracing::warn!(t, "did not expect timer callback"),
            }
        }
        SimCallback::Edge(sig_hdl) => {
            EDGE_MAP.with(|m| {
                let mut map = m.borrow_mut();
                let Some(callbacks) = map.get_mut(sig_hdl as u64) else {
                    tracing::warn!(sig_hdl, "did not expect edge callback");
                    return;
                };
                let mut resched: VecDeque<TrigShared> = VecDeque::new();
                for trig in callbacks.callbacks.drain(..) {
                    if trig.edge_kind == EdgeKind::Any || edge == EdgeKind::Any || trig.edge_kind == edge {
                        wake.push_back(trig);
                    } else {
                        resched.push_back(trig);
                    }
                }
                if resched.is_empty() {
                    // if no callbacks are remaining, cancel
                    cancel = map.remove(sig_hdl as u64).map(|cbs| cbs.handle);
                } else {
                    callbacks.callbacks = resched;
                }
            });
        }
    }

    if let Some(handle) = cancel {
        if let Ok(sim) = sim_if::current() {
            let _ = sim.cancel_callback(handle);
        }
    }
    if !wake.is_empty() {
        for shared in wake {
            shared.wake();
        }
        // execute woken tasks
        executor::run_once();
    }
}
