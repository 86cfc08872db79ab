use futures::{future::{BoxFuture, FutureExt}, task::{waker_ref, ArcWake, Context, Poll}};
use futures_channel::oneshot;
use queues::{IsQueue, Queue};
use std::{cell::RefCell, future::Future, pin::Pin, sync::{Arc, Mutex, PoisonError}};

use crate::error::{Error, Result};

thread_local! {
    static READY_QUEUE: RefCell<Queue<Arc<Task>>> = RefCell::new(Queue::new());
}

pub fn schedule_task(task: Arc<Task>) {
    READY_QUEUE.with(|q| {
        let _ = q.borrow_mut().add(task);
    });
}

fn next_task() -> Option<Arc<Task>> {
    READY_QUEUE.with(|q| q.borrow_mut().remove().ok())
}

pub(crate) fn clear_ready_queue() {
    READY_QUEUE.with(|q| *q.borrow_mut() = Queue::new());
}

#[inline]
pub fn run_once() {
    while let Some(task) = next_task() {
        process_task(task);
    }
}

#[inline]
fn process_task(task: Arc<Task>) {
    if *task.state.lock().unwrap_or_else(PoisonError::into_inner) == TaskState::Cancelled {
        // do not execute if state is cancelled, will be dropped once all references disappear
        return;
    }

    let mut fut_slot = task.future.lock().unwrap_or_else(PoisonError::into_inner);
    // a task may be woken more than once before it is processed, the later
    // wake-ups find the future already gone
    let Some(mut fut) = fut_slot.take() else {
        return;
    };
    let waker = waker_ref(&task);
    let context = &mut Context::from_waker(&*waker);
    let poll = fut.as_mut().poll(context);
    match poll {
        Poll::Pending => *fut_slot = Some(fut),
        Poll::Ready(result) => {
            drop(fut_slot);
            *task.state.lock().unwrap_or_else(PoisonError::into_inner) = TaskState::Done;
            if let Err(e) = &result {
                tracing::debug!(task = task.name.as_str(), error = %e, "task finished with error");
            }
            let tx = task.join_tx.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(tx) = tx {
                // the handle may already be gone, nobody is interested then
                let _ = tx.send(result);
            }
        }
    }
}

#[derive(PartialEq, Debug)]
enum TaskState {
    Pending,
    Done,
    Cancelled,
}

pub struct Task {
    future: Mutex<Option<BoxFuture<'static, Result<()>>>>,
    state: Mutex<TaskState>,
    name: String,
    join_tx: Mutex<Option<oneshot::Sender<Result<()>>>>,
}

impl Task {
    pub fn fork(future: impl Future<Output = Result<()>> + Send + 'static) -> JoinHandle {
        Task::spawn_from_future(future, "forked")
    }
    pub fn spawn_from_future(
        future: impl Future<Output = Result<()>> + Send + 'static,
        name: &str,
    ) -> JoinHandle {
        let (task, join_handle) = Task::new(future.boxed(), name);
        schedule_task(task);
        join_handle
    }
    fn new(fut: BoxFuture<'static, Result<()>>, name: &str) -> (Arc<Self>, JoinHandle) {
        let (tx, rx) = oneshot::channel();
        let task = Arc::new(Self {
            future: Mutex::new(Some(fut)),
            state: Mutex::new(TaskState::Pending),
            name: name.to_string(),
            join_tx: Mutex::new(Some(tx)),
        });
        let join_handle = JoinHandle {
            join_rx: rx,
            awaited_task: Some(task.clone()),
        };
        (task, join_handle)
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn cancel(&self) {
        // set state to Cancelled, the executor drops the Task without executing it
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = TaskState::Cancelled;
        // a task cancelling itself is still being polled and holds this lock
        if let Ok(mut fut) = self.future.try_lock() {
            fut.take();
        }
    }
    pub fn is_finished(&self) -> bool {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) != TaskState::Pending
    }
}

impl ArcWake for Task {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        schedule_task(arc_self.clone());
    }
}

pub struct JoinHandle {
    awaited_task: Option<Arc<Task>>,
    join_rx: oneshot::Receiver<Result<()>>,
}

impl JoinHandle {
    pub fn task(&self) -> Option<&Arc<Task>> {
        self.awaited_task.as_ref()
    }
    pub fn cancel(mut self) {
        // take awaited_task, cancel it and drop its reference
        if let Some(task) = self.awaited_task.take() {
            task.cancel();
        }
    }
}

impl Future for JoinHandle {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.join_rx.poll_unpin(cx) {
            Poll::Ready(result) => Poll::Ready(result.unwrap_or(Err(Error::Cancelled))),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rstb_obj::RstbObj;

    #[test]
    fn forked_tasks_run_in_fifo_order() {
        let log = RstbObj::new(Vec::new());
        for i in 0..3 {
            let log = log.clone();
            Task::fork(async move {
                log.with_mut(|l| l.push(i));
                Ok(())
            });
        }
        run_once();
        assert_eq!(*log.get(), vec![0, 1, 2]);
    }

    #[test]
    fn join_handle_returns_task_result() {
        let result = RstbObj::new(None);
        let slot = result.clone();
        Task::fork(async move {
            let inner = Task::fork(async { Err(Error::Config("boom".into())) });
            let r = inner.await;
            slot.with_mut(|s| *s = Some(r));
            Ok(())
        });
        run_once();
        assert_eq!(*result.get(), Some(Err(Error::Config("boom".into()))));
    }

    #[test]
    fn cancelled_task_never_runs() {
        let ran = RstbObj::new(false);
        let flag = ran.clone();
        let handle = Task::fork(async move {
            flag.with_mut(|f| *f = true);
            Ok(())
        });
        let task = handle.task().cloned();
        handle.cancel();
        run_once();
        assert!(!*ran.get());
        assert!(task.is_some_and(|t| t.is_finished()));
        clear_ready_queue();
    }
}
