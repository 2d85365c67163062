//! Deterministic cooperative scheduler.
//!
//! Exactly one logical executor exists per workflow. Tasks suspend only when
//! awaiting an unsettled promise; wakes re-enqueue the task id on a FIFO
//! microtask queue. The host runtime's scheduler is never involved, so the
//! interleaving observed by workflow code depends only on the activation
//! sequence.
//!
//! [`Scheduler::drain`] is the quiescence operation: it polls woken tasks in
//! queue order until the queue is empty and no further progress is possible
//! without an external event.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll, Wake, Waker};
use tracing::trace;

type TaskId = u64;
type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

struct SchedulerState {
    next_task_id: TaskId,
    tasks: HashMap<TaskId, TaskFuture>,
    /// Microtask queue: task ids in wake order.
    ready: VecDeque<TaskId>,
}

#[derive(Clone)]
pub struct Scheduler {
    state: Arc<Mutex<SchedulerState>>,
}

struct TaskWaker {
    task_id: TaskId,
    state: Weak<Mutex<SchedulerState>>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        if let Some(state) = self.state.upgrade() {
            state
                .lock()
                .expect("scheduler state poisoned")
                .ready
                .push_back(self.task_id);
        }
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SchedulerState {
                next_task_id: 0,
                tasks: HashMap::new(),
                ready: VecDeque::new(),
            })),
        }
    }

    /// Add a task and queue its first poll. The task does not run until the
    /// next [`drain`](Self::drain).
    pub fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        let mut state = self.state.lock().expect("scheduler state poisoned");
        let task_id = state.next_task_id;
        state.next_task_id += 1;
        state.tasks.insert(task_id, Box::pin(fut));
        state.ready.push_back(task_id);
        trace!(target: "driftcore::scheduler", task_id, "task spawned");
    }

    /// Run queued tasks until the microtask queue is empty.
    ///
    /// Wakes raised while a task runs (a resolver settling, a task spawning
    /// another) land behind the already-queued batch, so ordering is plain
    /// FIFO. Entries for tasks that already completed are skipped; a task
    /// woken more than once before it runs is simply polled again, which a
    /// correct future tolerates.
    pub fn drain(&self) {
        loop {
            let (task_id, mut task) = {
                let mut state = self.state.lock().expect("scheduler state poisoned");
                let mut popped = None;
                while let Some(task_id) = state.ready.pop_front() {
                    if let Some(task) = state.tasks.remove(&task_id) {
                        popped = Some((task_id, task));
                        break;
                    }
                }
                match popped {
                    Some(entry) => entry,
                    None => return,
                }
            };

            // Poll outside the lock: the task may settle promises or spawn,
            // both of which take the scheduler lock through the waker.
            let waker = Waker::from(Arc::new(TaskWaker {
                task_id,
                state: Arc::downgrade(&self.state),
            }));
            let mut cx = Context::from_waker(&waker);
            match task.as_mut().poll(&mut cx) {
                Poll::Ready(()) => {
                    trace!(target: "driftcore::scheduler", task_id, "task completed");
                }
                Poll::Pending => {
                    self.state
                        .lock()
                        .expect("scheduler state poisoned")
                        .tasks
                        .insert(task_id, task);
                }
            }
        }
    }

    /// Tasks still suspended on an external event.
    pub fn pending_tasks(&self) -> usize {
        self.state
            .lock()
            .expect("scheduler state poisoned")
            .tasks
            .len()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
