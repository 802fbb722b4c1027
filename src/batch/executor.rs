//! Background threads running batch flushes
//!
//! One timer thread keeps the pending deadlines in a heap and hands due
//! flushes to a small fixed pool of workers over a channel. Application
//! threads only ever send timer commands.

use super::policy::deadline_after;
use super::scheduler::{FlushJob, FlushTimer, Scheduler};
use crate::core::status::{panic_message, StatusChannel};
use crate::core::{LoggerError, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, SendError, Sender};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Number of flush workers of the global executor
pub const DEFAULT_WORKER_COUNT: usize = 3;

/// Maximum time `shutdown` waits for pending flushes to drain
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

type WeakAction = Weak<dyn Fn() + Send + Sync>;

enum Work {
    Flush(WeakAction),
    Job(FlushJob),
}

enum TimerCommand {
    Schedule(PendingFlush),
    Shutdown,
}

struct PendingFlush {
    deadline: Instant,
    sequence: u64,
    generation: Arc<AtomicU64>,
    expected: u64,
    action: WeakAction,
}

impl PendingFlush {
    fn is_current(&self) -> bool {
        self.generation.load(Ordering::Acquire) == self.expected
    }
}

// Min-heap on (deadline, sequence)
impl Ord for PendingFlush {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for PendingFlush {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PendingFlush {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.sequence == other.sequence
    }
}

impl Eq for PendingFlush {}

/// Timer thread plus worker pool shared by batching observers
pub struct FlushExecutor {
    this: Weak<FlushExecutor>,
    commands: Sender<TimerCommand>,
    work: Mutex<Option<Sender<Work>>>,
    actions: Mutex<Vec<WeakAction>>,
    sequence: AtomicU64,
    stopped: AtomicBool,
    timer_thread: Mutex<Option<JoinHandle<()>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

static GLOBAL_EXECUTOR: Lazy<std::result::Result<Arc<FlushExecutor>, String>> =
    Lazy::new(|| FlushExecutor::new(DEFAULT_WORKER_COUNT).map_err(|e| e.to_string()));

impl FlushExecutor {
    /// Start the timer thread and `worker_count` workers (at least one)
    pub fn new(worker_count: usize) -> Result<Arc<Self>> {
        let (command_tx, command_rx) = unbounded();
        let (work_tx, work_rx) = unbounded::<Work>();

        let mut workers = Vec::new();
        for index in 0..worker_count.max(1) {
            let receiver = work_rx.clone();
            let handle = thread::Builder::new()
                .name(format!("logevents-flush-{}", index))
                .spawn(move || run_worker(receiver))
                .map_err(|e| LoggerError::WorkerSpawn(e.to_string()))?;
            workers.push(handle);
        }

        let timer_work = work_tx.clone();
        let timer_thread = thread::Builder::new()
            .name("logevents-timer".to_string())
            .spawn(move || run_timer(command_rx, timer_work))
            .map_err(|e| LoggerError::WorkerSpawn(e.to_string()))?;

        Ok(Arc::new_cyclic(|this| Self {
            this: this.clone(),
            commands: command_tx,
            work: Mutex::new(Some(work_tx)),
            actions: Mutex::new(Vec::new()),
            sequence: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
            timer_thread: Mutex::new(Some(timer_thread)),
            workers: Mutex::new(workers),
        }))
    }

    /// Process-wide executor, started on first use
    pub fn global() -> Result<Arc<FlushExecutor>> {
        match &*GLOBAL_EXECUTOR {
            Ok(executor) => Ok(Arc::clone(executor)),
            Err(message) => Err(LoggerError::WorkerSpawn(message.clone())),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Drain every registered flush action and stop all threads
    ///
    /// Pending deadlines are not waited for; their batches are flushed right
    /// away. Returns `false` if the threads did not finish within `timeout`.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return true;
        }
        let start = Instant::now();

        let _ = self.commands.send(TimerCommand::Shutdown);
        if let Some(handle) = self.timer_thread.lock().take() {
            if !wait_for(handle, start, timeout) {
                return false;
            }
        }

        if let Some(work) = self.work.lock().take() {
            let actions = std::mem::take(&mut *self.actions.lock());
            for action in actions {
                if action.strong_count() > 0 {
                    let _ = work.send(Work::Flush(action));
                }
            }
            // Dropping the last sender lets workers exit once the queue is empty
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        let mut finished = true;
        for handle in workers {
            finished &= wait_for(handle, start, timeout);
        }
        finished
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }
}

impl Scheduler for FlushExecutor {
    fn create_timer(&self, action: Weak<dyn Fn() + Send + Sync>) -> Box<dyn FlushTimer> {
        let mut actions = self.actions.lock();
        actions.retain(|registered| registered.strong_count() > 0);
        actions.push(action.clone());
        Box::new(ExecutorTimer {
            executor: self.this.clone(),
            generation: Arc::new(AtomicU64::new(0)),
            action,
        })
    }

    fn execute(&self, job: FlushJob) -> std::result::Result<(), FlushJob> {
        let work = self.work.lock();
        match work.as_ref() {
            Some(sender) if !self.is_stopped() => {
                if let Err(SendError(Work::Job(job))) = sender.send(Work::Job(job)) {
                    return Err(job);
                }
                Ok(())
            }
            _ => Err(job),
        }
    }
}

struct ExecutorTimer {
    executor: Weak<FlushExecutor>,
    generation: Arc<AtomicU64>,
    action: WeakAction,
}

impl FlushTimer for ExecutorTimer {
    fn schedule(&self, delay: Duration) {
        let expected = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let delivered = match self.executor.upgrade() {
            Some(executor) if !executor.is_stopped() => executor
                .commands
                .send(TimerCommand::Schedule(PendingFlush {
                    deadline: deadline_after(Instant::now(), delay),
                    sequence: executor.next_sequence(),
                    generation: Arc::clone(&self.generation),
                    expected,
                    action: self.action.clone(),
                }))
                .is_ok(),
            _ => false,
        };
        if !delivered {
            StatusChannel::global().add_error(
                "FlushExecutor",
                "Executor is stopped; scheduled flush dropped",
                Some(&LoggerError::ExecutorStopped),
            );
        }
    }
}

fn run_timer(commands: Receiver<TimerCommand>, work: Sender<Work>) {
    let mut pending: BinaryHeap<PendingFlush> = BinaryHeap::new();
    loop {
        let now = Instant::now();
        while pending.peek().is_some_and(|next| next.deadline <= now) {
            if let Some(due) = pending.pop() {
                if due.is_current() && work.send(Work::Flush(due.action)).is_err() {
                    return;
                }
            }
        }

        let command = match pending.peek() {
            Some(next) => match commands.recv_timeout(next.deadline.saturating_duration_since(now)) {
                Ok(command) => command,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return,
            },
            None => match commands.recv() {
                Ok(command) => command,
                Err(_) => return,
            },
        };

        match command {
            TimerCommand::Schedule(flush) => {
                // Superseded entries are dropped lazily when they come due
                pending.push(flush);
            }
            TimerCommand::Shutdown => return,
        }
    }
}

fn run_worker(work: Receiver<Work>) {
    for item in work {
        let outcome = match item {
            Work::Flush(action) => match action.upgrade() {
                Some(action) => catch_unwind(AssertUnwindSafe(|| action())),
                None => continue,
            },
            Work::Job(job) => catch_unwind(AssertUnwindSafe(job)),
        };
        if let Err(panic_info) = outcome {
            StatusChannel::global().add_fatal(
                "FlushExecutor",
                format!("Flush action panicked: {}", panic_message(&*panic_info)),
                None,
            );
        }
    }
}

fn wait_for(handle: JoinHandle<()>, start: Instant, timeout: Duration) -> bool {
    loop {
        if handle.is_finished() {
            if handle.join().is_err() {
                eprintln!("[LOGGER ERROR] Flush thread panicked during shutdown");
                return false;
            }
            return true;
        }
        if start.elapsed() >= timeout {
            eprintln!(
                "[LOGGER WARNING] Flush threads did not finish within {:?} timeout. \
                 Some batches may be lost.",
                timeout
            );
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_action() -> (Arc<dyn Fn() + Send + Sync>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let action: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (action, count)
    }

    fn wait_until(condition: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(5) {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_immediate_flush_runs_on_worker() {
        let executor = FlushExecutor::new(2).unwrap();
        let caller = thread::current().id();
        let ran_on = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&ran_on);
        let action: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
            *slot.lock() = Some(thread::current().id());
        });

        let timer = executor.create_timer(Arc::downgrade(&action));
        timer.schedule(Duration::ZERO);

        assert!(wait_until(|| ran_on.lock().is_some()));
        assert_ne!(*ran_on.lock(), Some(caller));
        assert!(executor.shutdown(DEFAULT_SHUTDOWN_TIMEOUT));
    }

    #[test]
    fn test_rescheduling_supersedes_pending_deadline() {
        let executor = FlushExecutor::new(1).unwrap();
        let (action, count) = counting_action();
        let timer = executor.create_timer(Arc::downgrade(&action));

        timer.schedule(Duration::from_millis(30));
        timer.schedule(Duration::from_millis(60));
        timer.schedule(Duration::from_millis(90));

        assert!(wait_until(|| count.load(Ordering::SeqCst) == 1));
        thread::sleep(Duration::from_millis(150));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        executor.shutdown(DEFAULT_SHUTDOWN_TIMEOUT);
    }

    #[test]
    fn test_shutdown_drains_registered_actions() {
        let executor = FlushExecutor::new(1).unwrap();
        let (action, count) = counting_action();
        let timer = executor.create_timer(Arc::downgrade(&action));
        timer.schedule(Duration::from_secs(3600));

        assert!(executor.shutdown(DEFAULT_SHUTDOWN_TIMEOUT));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(executor.is_stopped());

        // Scheduling after shutdown is reported, not raised
        timer.schedule(Duration::ZERO);
        assert!(executor.shutdown(DEFAULT_SHUTDOWN_TIMEOUT));
    }

    #[test]
    fn test_jobs_run_on_workers_until_shutdown() {
        let executor = FlushExecutor::new(1).unwrap();
        let caller = thread::current().id();
        let ran_on = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&ran_on);
        let job: FlushJob = Box::new(move || {
            *slot.lock() = Some(thread::current().id());
        });
        assert!(executor.execute(job).is_ok());
        assert!(wait_until(|| ran_on.lock().is_some()));
        assert_ne!(*ran_on.lock(), Some(caller));

        assert!(executor.shutdown(DEFAULT_SHUTDOWN_TIMEOUT));
        let (action, count) = counting_action();
        let rejected = executor.execute(Box::new(move || action()));
        let Err(job) = rejected else {
            panic!("a stopped executor must hand the job back");
        };
        job();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_actions_are_skipped() {
        let executor = FlushExecutor::new(1).unwrap();
        let (action, count) = counting_action();
        let timer = executor.create_timer(Arc::downgrade(&action));
        drop(action);
        timer.schedule(Duration::ZERO);
        assert!(executor.shutdown(DEFAULT_SHUTDOWN_TIMEOUT));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
