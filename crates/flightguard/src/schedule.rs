//! Periodic execution contexts.
//!
//! Each loop runs on its own named OS thread and ticks at a fixed period
//! until its [`TaskHandle`] is signaled. Ticks are scheduled against an
//! absolute deadline, so a slow tick shortens the following sleep instead of
//! pushing every later tick back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{Error, Result};

/// A unit of work run once per period.
pub trait PeriodicTask: Send + 'static {
    /// Thread name for this task.
    fn name(&self) -> &'static str;

    /// Time between tick starts.
    fn period(&self) -> Duration;

    /// Runs once on the task's thread before the first tick.
    fn on_start(&mut self) {}

    /// One cycle of work.
    fn tick(&mut self);
}

/// A lightweight, cloneable stop signal shared with a running task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    name: &'static str,
    stop_signal: Arc<AtomicBool>,
}

impl TaskHandle {
    /// Create a new handle.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            stop_signal: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Name of the task this handle controls.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the task to stop after its current tick.
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Check if the stop signal has been sent.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }
}

/// A collection of task handles that can be stopped together.
#[derive(Debug, Default)]
pub struct TaskManager {
    handles: Vec<TaskHandle>,
}

impl TaskManager {
    /// Create a new task manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task handle to manage.
    pub fn add(&mut self, handle: TaskHandle) {
        self.handles.push(handle);
    }

    /// Stop all tasks.
    pub fn stop_all(&self) {
        for handle in &self.handles {
            handle.stop();
        }
    }

    /// Get the number of managed tasks.
    #[must_use]
    pub fn count(&self) -> usize {
        self.handles.len()
    }

    /// Check if any task has not been signaled to stop.
    #[must_use]
    pub fn any_running(&self) -> bool {
        self.handles.iter().any(|h| !h.should_stop())
    }
}

/// Drive `task` on the current thread until `handle` is signaled.
///
/// Returns the number of ticks run.
pub fn run_periodic<T: PeriodicTask>(task: &mut T, handle: &TaskHandle) -> u64 {
    let period = task.period();
    task.on_start();
    info!(task = task.name(), ?period, "task started");

    let mut ticks = 0_u64;
    let mut deadline = Instant::now();
    while !handle.should_stop() {
        task.tick();
        ticks += 1;

        deadline += period;
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        } else {
            // Overran; resynchronize rather than bursting to catch up.
            debug!(task = task.name(), overrun = ?(now - deadline), "tick overran period");
            deadline = now;
        }
    }

    info!(task = task.name(), ticks, "task stopped");
    ticks
}

/// Spawn `task` on its own named thread.
///
/// The thread runs until `handle` is signaled and yields the tick count.
///
/// # Errors
///
/// Returns an error if the thread cannot be spawned.
pub fn spawn_periodic<T: PeriodicTask>(
    mut task: T,
    handle: TaskHandle,
) -> Result<JoinHandle<u64>> {
    thread::Builder::new()
        .name(task.name().to_string())
        .spawn(move || run_periodic(&mut task, &handle))
        .map_err(|e| Error::internal(format!("failed to spawn task thread: {e}")))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;

    use super::*;

    struct Counter {
        period: Duration,
        started: bool,
        ticks: Arc<AtomicU64>,
        stop_after: u64,
        handle: TaskHandle,
    }

    impl PeriodicTask for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        fn period(&self) -> Duration {
            self.period
        }

        fn on_start(&mut self) {
            self.started = true;
        }

        fn tick(&mut self) {
            assert!(self.started, "tick before on_start");
            let n = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.stop_after {
                self.handle.stop();
            }
        }
    }

    fn counter(stop_after: u64, handle: &TaskHandle) -> (Counter, Arc<AtomicU64>) {
        let ticks = Arc::new(AtomicU64::new(0));
        let task = Counter {
            period: Duration::from_millis(1),
            started: false,
            ticks: Arc::clone(&ticks),
            stop_after,
            handle: handle.clone(),
        };
        (task, ticks)
    }

    #[test]
    fn test_task_handle_new() {
        let handle = TaskHandle::new("sampling");
        assert_eq!(handle.name(), "sampling");
        assert!(!handle.should_stop());
    }

    #[test]
    fn test_task_handle_stop_is_one_way() {
        let handle = TaskHandle::new("sampling");
        assert!(!handle.should_stop());
        handle.stop();
        assert!(handle.should_stop());
        handle.stop();
        assert!(handle.should_stop());
    }

    #[test]
    fn test_task_handle_clone_shares_signal() {
        let handle1 = TaskHandle::new("inference");
        let handle2 = handle1.clone();

        handle1.stop();
        assert!(handle2.should_stop());
    }

    #[test]
    fn test_task_manager_stop_all() {
        let mut manager = TaskManager::new();
        assert_eq!(manager.count(), 0);

        let handle1 = TaskHandle::new("sampling");
        let handle2 = TaskHandle::new("inference");
        manager.add(handle1.clone());
        manager.add(handle2.clone());
        assert_eq!(manager.count(), 2);
        assert!(manager.any_running());

        handle1.stop();
        assert!(manager.any_running());

        manager.stop_all();
        assert!(handle2.should_stop());
        assert!(!manager.any_running());
    }

    #[test]
    fn test_run_periodic_stops_on_signal() {
        let handle = TaskHandle::new("counter");
        let (mut task, ticks) = counter(5, &handle);

        let ran = run_periodic(&mut task, &handle);
        assert_eq!(ran, 5);
        assert_eq!(ticks.load(Ordering::SeqCst), 5);
        assert!(task.started);
    }

    #[test]
    fn test_run_periodic_already_stopped() {
        let handle = TaskHandle::new("counter");
        handle.stop();
        let (mut task, ticks) = counter(100, &handle);

        assert_eq!(run_periodic(&mut task, &handle), 0);
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_spawn_periodic_names_thread() {
        struct NameCheck {
            seen: Arc<parking_lot::Mutex<Option<String>>>,
            handle: TaskHandle,
        }

        impl PeriodicTask for NameCheck {
            fn name(&self) -> &'static str {
                "name-check"
            }

            fn period(&self) -> Duration {
                Duration::from_millis(1)
            }

            fn tick(&mut self) {
                *self.seen.lock() = thread::current().name().map(str::to_string);
                self.handle.stop();
            }
        }

        let handle = TaskHandle::new("name-check");
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let task = NameCheck {
            seen: Arc::clone(&seen),
            handle: handle.clone(),
        };

        let join = spawn_periodic(task, handle).unwrap();
        assert_eq!(join.join().unwrap(), 1);
        assert_eq!(seen.lock().as_deref(), Some("name-check"));
    }

    #[test]
    fn test_spawned_task_stops_from_outside() {
        let handle = TaskHandle::new("counter");
        let (task, ticks) = counter(u64::MAX, &handle);

        let join = spawn_periodic(task, handle.clone()).unwrap();
        while ticks.load(Ordering::SeqCst) < 3 {
            thread::sleep(Duration::from_millis(1));
        }
        handle.stop();

        let ran = join.join().unwrap();
        assert!(ran >= 3);
    }
}
