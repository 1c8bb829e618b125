// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Timer Scheduler
//!
//! One scheduler per connection engine instance. Each timer (reconnect,
//! idle, keep-alive) is a cancellable delayed task on a single dedicated
//! thread; tasks run on that thread and must not block for long.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Handle for cancelling a scheduled task.
pub type TaskId = u64;

struct ScheduledTask {
    id: TaskId,
    deadline: Instant,
    run: Box<dyn FnOnce() + Send>,
}

#[derive(Default)]
struct SchedulerState {
    tasks: Vec<ScheduledTask>,
    next_id: TaskId,
    shutdown: bool,
}

struct SchedulerInner {
    state: Mutex<SchedulerState>,
    cv: Condvar,
}

/// Deadline-ordered task runner backing the engine's timers.
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new() -> Self {
        let inner = Arc::new(SchedulerInner {
            state: Mutex::new(SchedulerState::default()),
            cv: Condvar::new(),
        });

        let thread_inner = inner.clone();
        std::thread::Builder::new()
            .name("routerlink-timer".into())
            .spawn(move || Self::run(thread_inner))
            .expect("failed to spawn timer thread");

        Scheduler { inner }
    }

    fn run(inner: Arc<SchedulerInner>) {
        let mut state = inner.state.lock();
        loop {
            if state.shutdown {
                return;
            }

            let now = Instant::now();
            if let Some(pos) = state.tasks.iter().position(|t| t.deadline <= now) {
                let task = state.tasks.swap_remove(pos);
                // Run without the lock so tasks can schedule and cancel.
                drop(state);
                (task.run)();
                state = inner.state.lock();
                continue;
            }

            match state.tasks.iter().map(|t| t.deadline).min() {
                Some(deadline) => {
                    inner.cv.wait_until(&mut state, deadline);
                }
                None => inner.cv.wait(&mut state),
            }
        }
    }

    /// Schedules `task` to run after `delay`. Returns an id usable with
    /// [`Scheduler::cancel`] until the task has fired.
    pub fn schedule(&self, delay: Duration, task: impl FnOnce() + Send + 'static) -> TaskId {
        let mut state = self.inner.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.tasks.push(ScheduledTask {
            id,
            deadline: Instant::now() + delay,
            run: Box::new(task),
        });
        self.inner.cv.notify_one();
        id
    }

    /// Cancels a pending task. Returns false when it already fired (or
    /// was cancelled before).
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut state = self.inner.state.lock();
        let before = state.tasks.len();
        state.tasks.retain(|t| t.id != id);
        state.tasks.len() != before
    }

    /// Stops the scheduler thread. Pending tasks never fire.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        state.shutdown = true;
        state.tasks.clear();
        self.inner.cv.notify_all();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
