//! The task queue scheduler.
//!
//! [`TaskQueue`] owns a FIFO of [`Task`]s and a single background loop that works through it:
//! - The front task is repeated until `done == total`, then removed.
//! - Each repeat is tried up to `num_tries` times with handler-specific backoff.
//! - A repeat that exhausts its tries halts the whole run. The task stays queued.
//! - After a randomized number of successes the loop takes one long session pause.
//!
//! Tasks never run in parallel. Stopping is cooperative and never aborts an in-flight attempt.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::{LoomError, Result};
use crate::queue::RingQueue;
use crate::scheduler::estimator::{EstimateKind, TimeEstimator};
use crate::scheduler::events::{EventBus, QueueEvent};
use crate::scheduler::handler::TaskHandler;
use crate::scheduler::pacing::PacingConfig;
use crate::scheduler::run::TaskRun;
use crate::scheduler::task::{CostItem, Task, TaskInfo, TaskStats};

/// Message carried by the error event when a handler returns `Ok(false)`.
pub const NO_RESULT_MESSAGE: &str = "handler reported no result";

type GroupKey = (String, String);

struct QueueState<P> {
    queue: RingQueue<Task<P>>,
    type_stats: HashMap<String, TaskStats>,
    group_stats: HashMap<GroupKey, TaskStats>,
    estimators: HashMap<String, TimeEstimator>,
    current_run: Option<Arc<TaskRun>>,
}

impl<P> QueueState<P> {
    fn track(&mut self, task: &Task<P>) {
        self.type_stats.entry(task.task_type.clone()).or_default().add(task);
        self.group_stats
            .entry((task.task_type.clone(), task.group_key.clone()))
            .or_default()
            .add(task);
    }

    fn untrack(&mut self, task: &Task<P>) {
        if let Some(stats) = self.type_stats.get_mut(&task.task_type) {
            stats.subtract(task);
        }
        let key = (task.task_type.clone(), task.group_key.clone());
        if let Some(stats) = self.group_stats.get_mut(&key) {
            stats.subtract(task);
            if stats.total == 0 {
                self.group_stats.remove(&key);
            }
        }
    }

    /// Count one success for the front task if it is still the task with `id`.
    fn count_done(&mut self, id: &str) -> bool {
        let (task_type, group_key) = match self.queue.peek_mut() {
            Some(front) if front.id == id => {
                front.done += 1;
                (front.task_type.clone(), front.group_key.clone())
            }
            _ => return false,
        };
        if let Some(stats) = self.type_stats.get_mut(&task_type) {
            stats.done = stats.done.saturating_add(1);
        }
        if let Some(stats) = self.group_stats.get_mut(&(task_type, group_key)) {
            stats.done = stats.done.saturating_add(1);
        }
        true
    }
}

/// What the loop should do next.
enum Next<P: Send + Sync + 'static> {
    Work(Task<P>, Arc<dyn TaskHandler<P>>),
    Drained,
    Missing(String),
}

struct Inner<P: Send + Sync + 'static> {
    handlers: HashMap<String, Arc<dyn TaskHandler<P>>>,
    pacing: PacingConfig,
    events: EventBus,
    state: Mutex<QueueState<P>>,
    /// Held by the active loop; a restarted run waits here for the old loop to exit
    loop_guard: tokio::sync::Mutex<()>,
}

/// Serial task scheduler with per-type handlers.
///
/// Cloning yields another handle to the same queue.
pub struct TaskQueue<P: Send + Sync + 'static> {
    inner: Arc<Inner<P>>,
}

impl<P: Send + Sync + 'static> Clone for TaskQueue<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Send + Sync + 'static> TaskQueue<P> {
    pub fn new(handlers: Vec<Arc<dyn TaskHandler<P>>>, pacing: PacingConfig) -> Self {
        let mut by_type = HashMap::new();
        let mut estimators = HashMap::new();
        for handler in handlers {
            let task_type = handler.task_type().to_string();
            estimators.insert(task_type.clone(), handler.create_time_estimator());
            by_type.insert(task_type, handler);
        }

        Self {
            inner: Arc::new(Inner {
                handlers: by_type,
                pacing,
                events: EventBus::new(),
                state: Mutex::new(QueueState {
                    queue: RingQueue::new(),
                    type_stats: HashMap::new(),
                    group_stats: HashMap::new(),
                    estimators,
                    current_run: None,
                }),
                loop_guard: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    pub fn handler_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.inner.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    /// Queue `total` executions of a task. Returns the new task's id.
    pub fn add_task(&self, task_type: &str, params: P, total: u32) -> Result<String> {
        let handler = self.inner.handler(task_type)?;
        let mut task = Task::new(task_type, params, total);
        task.group_key = handler.group_key(&task);
        let id = task.id.clone();

        tracing::debug!(task_id = %id, task_type, group = %task.group_key, total, "Task added");
        {
            let mut state = self.inner.lock();
            state.track(&task);
            state.queue.enqueue(task);
        }
        self.inner.events.emit(QueueEvent::Progress);
        Ok(id)
    }

    pub fn remove_all_tasks(&self) -> usize {
        let removed = {
            let mut state = self.inner.lock();
            let drained: Vec<Task<P>> = state.queue.drain().collect();
            for task in &drained {
                state.untrack(task);
            }
            drained.len()
        };
        tracing::debug!(removed, "All tasks removed");
        self.inner.events.emit(QueueEvent::Progress);
        removed
    }

    /// Remove every task of `task_type` whose group key is `group_key`, keeping the rest in order.
    pub fn remove_tasks_from_scene(&self, task_type: &str, group_key: &str) -> usize {
        let removed = {
            let mut state = self.inner.lock();
            let drained: Vec<Task<P>> = state.queue.drain().collect();
            let mut removed = 0;
            for task in drained {
                state.untrack(&task);
                if task.task_type == task_type && task.group_key == group_key {
                    removed += 1;
                } else {
                    state.track(&task);
                    state.queue.enqueue(task);
                }
            }
            removed
        };
        tracing::debug!(task_type, group = group_key, removed, "Scene tasks removed");
        self.inner.events.emit(QueueEvent::Progress);
        removed
    }

    /// Start the background loop. Returns `None` if a run is already active.
    ///
    /// A loop left over from a stopped run finishes its in-flight attempt before the new loop
    /// takes its first task.
    pub fn run(&self) -> Option<JoinHandle<()>> {
        let run = {
            let mut state = self.inner.lock();
            if state.current_run.is_some() {
                return None;
            }
            let run = Arc::new(TaskRun::new(self.inner.pacing.long_pause_interval()));
            state.current_run = Some(Arc::clone(&run));
            run
        };
        tracing::info!(tasks = self.len(), "Task queue started");
        self.inner.events.emit(QueueEvent::Start);

        let inner = Arc::clone(&self.inner);
        Some(tokio::spawn(async move { inner.run_loop(run).await }))
    }

    /// Request the active run to stop.
    ///
    /// Takes effect at the loop's next checkpoint. An attempt already in flight finishes but is
    /// not counted.
    pub fn stop(&self) {
        let run = self.inner.lock().current_run.take();
        if let Some(run) = run {
            run.stop();
            tracing::info!("Task queue stopped");
            self.inner.events.emit(QueueEvent::Stop);
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().current_run.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Snapshot of the queued tasks in order.
    pub fn tasks(&self) -> Vec<Task<P>> {
        self.inner.lock().queue.iter().cloned().collect()
    }

    pub fn stats_all(&self) -> TaskStats {
        self.inner
            .lock()
            .type_stats
            .values()
            .fold(TaskStats::default(), |acc, stats| acc.merge(*stats))
    }

    pub fn stats_for_type(&self, task_type: &str) -> TaskStats {
        self.inner.lock().type_stats.get(task_type).copied().unwrap_or_default()
    }

    pub fn stats_for_group(&self, task_type: &str, group_key: &str) -> TaskStats {
        self.inner
            .lock()
            .group_stats
            .get(&(task_type.to_string(), group_key.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// Stats summed over every task type sharing `group_key`.
    pub fn stats_for_scene(&self, group_key: &str) -> TaskStats {
        self.inner
            .lock()
            .group_stats
            .iter()
            .filter(|((_, key), _)| key == group_key)
            .fold(TaskStats::default(), |acc, (_, stats)| acc.merge(*stats))
    }

    /// Estimated duration of one execution of the front task. Zero when the queue is empty.
    pub fn estimate_top_task_time(&self, kind: EstimateKind) -> Duration {
        let state = self.inner.lock();
        state
            .queue
            .peek()
            .and_then(|task| state.estimators.get(&task.task_type))
            .map(|estimator| estimator.estimate(kind))
            .unwrap_or_default()
    }

    /// Estimated time to finish every queued execution.
    pub fn estimate_total_time(&self, kind: EstimateKind) -> Duration {
        let state = self.inner.lock();
        state
            .type_stats
            .iter()
            .filter_map(|(task_type, stats)| {
                let estimator = state.estimators.get(task_type)?;
                Some(estimator.estimate(kind) * stats.remaining())
            })
            .sum()
    }

    pub fn calculate_cost(&self) -> Vec<CostItem> {
        let tasks = self.tasks();
        tasks
            .iter()
            .filter_map(|task| {
                let handler = self.inner.handlers.get(&task.task_type)?;
                Some(handler.calculate_cost(task))
            })
            .flatten()
            .collect()
    }

    pub fn task_info(&self, task: &Task<P>) -> Option<TaskInfo> {
        self.inner.handlers.get(&task.task_type).map(|handler| handler.info(task))
    }
}

impl<P: Send + Sync + 'static> Inner<P> {
    fn lock(&self) -> MutexGuard<'_, QueueState<P>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handler(&self, task_type: &str) -> Result<Arc<dyn TaskHandler<P>>> {
        self.handlers
            .get(task_type)
            .cloned()
            .ok_or_else(|| LoomError::UnknownTaskType(task_type.to_string()))
    }

    /// Drop finished tasks from the front and return the next one to work on.
    fn next_task(&self) -> Next<P> {
        let mut state = self.lock();
        loop {
            let Some(front) = state.queue.peek() else {
                return Next::Drained;
            };
            if front.is_finished() {
                if let Ok(task) = state.queue.dequeue() {
                    tracing::debug!(task_id = %task.id, done = task.done, "Task finished");
                    state.untrack(&task);
                }
                continue;
            }
            let task = front.clone();
            return match self.handlers.get(&task.task_type) {
                Some(handler) => Next::Work(task, Arc::clone(handler)),
                None => Next::Missing(task.task_type),
            };
        }
    }

    /// End `run` if it is still the active one. Emits exactly one stop per run.
    fn finish(&self, run: &Arc<TaskRun>) {
        let ended = {
            let mut state = self.lock();
            match &state.current_run {
                Some(current) if Arc::ptr_eq(current, run) => {
                    state.current_run = None;
                    true
                }
                _ => false,
            }
        };
        run.stop();
        if ended {
            self.events.emit(QueueEvent::Stop);
        }
    }

    async fn run_loop(self: Arc<Self>, run: Arc<TaskRun>) {
        let _guard = self.loop_guard.lock().await;
        self.events.emit(QueueEvent::Progress);
        while !run.is_stopped() {
            let (task, handler) = match self.next_task() {
                Next::Work(task, handler) => (task, handler),
                Next::Drained => {
                    tracing::info!("Task queue drained");
                    self.finish(&run);
                    break;
                }
                Next::Missing(task_type) => {
                    tracing::error!(task_type = %task_type, "No handler for queued task");
                    self.finish(&run);
                    break;
                }
            };

            match self.execute(&task, handler.as_ref(), &run).await {
                Outcome::Succeeded => {}
                Outcome::Interrupted => break,
                Outcome::Removed => {
                    tracing::debug!(task_id = %task.id, "Task removed while in flight, moving on");
                }
                Outcome::Exhausted => {
                    tracing::error!(
                        task_id = %task.id,
                        task_type = %task.task_type,
                        "Task exhausted all attempts, halting queue"
                    );
                    self.finish(&run);
                    break;
                }
            }
        }
        self.events.emit(QueueEvent::Progress);
    }

    /// Run one repeat of `task` with retries.
    async fn execute(&self, task: &Task<P>, handler: &dyn TaskHandler<P>, run: &Arc<TaskRun>) -> Outcome {
        let tries = handler.num_tries(task);
        let started = Instant::now();

        for attempt in 0..tries {
            if run.is_stopped() {
                return Outcome::Interrupted;
            }
            handler.handle_delay(task, attempt).await;
            if run.is_stopped() {
                return Outcome::Interrupted;
            }
            if !self.is_front(&task.id) {
                return Outcome::Removed;
            }

            let message = match handler.handle_task(task, run).await {
                Ok(true) => {
                    self.on_success(task, started.elapsed(), run).await;
                    return if run.is_stopped() {
                        Outcome::Interrupted
                    } else {
                        Outcome::Succeeded
                    };
                }
                Ok(false) => NO_RESULT_MESSAGE.to_string(),
                Err(e) if e.is_policy_violation() => {
                    tracing::warn!(task_id = %task.id, error = %e, "IP check failed, stopping queue");
                    self.events.emit(QueueEvent::IpCheckFail);
                    self.finish(run);
                    return Outcome::Interrupted;
                }
                Err(e) => e.to_string(),
            };

            tracing::warn!(
                task_id = %task.id,
                task_type = %task.task_type,
                attempt,
                tries,
                error = %message,
                "Task attempt failed"
            );
            self.events.emit(QueueEvent::Error {
                task_id: task.id.clone(),
                task_type: task.task_type.clone(),
                message,
            });
            if !self.is_front(&task.id) {
                return Outcome::Removed;
            }
        }
        Outcome::Exhausted
    }

    /// True while `id` is still the task at the queue front.
    fn is_front(&self, id: &str) -> bool {
        self.lock().queue.peek().is_some_and(|front| front.id == id)
    }

    async fn on_success(&self, task: &Task<P>, elapsed: Duration, run: &TaskRun) {
        if let Some(estimator) = self.lock().estimators.get_mut(&task.task_type) {
            estimator.add_sample(elapsed);
        }

        if run.count_success() {
            let pause = self.pacing.long_pause();
            tracing::info!(pause_secs = pause.as_secs(), "Session pause");
            tokio::time::sleep(pause).await;
            run.reset_delay_count(self.pacing.long_pause_interval());
        }

        if run.is_stopped() {
            tracing::debug!(task_id = %task.id, "Run stopped during attempt, result not counted");
            return;
        }
        let counted = self.lock().count_done(&task.id);
        if counted {
            tracing::debug!(task_id = %task.id, elapsed_ms = elapsed.as_millis() as u64, "Task execution complete");
        } else {
            tracing::debug!(task_id = %task.id, "Task removed while in flight, result not counted");
        }
        self.events.emit(QueueEvent::Complete {
            task_id: task.id.clone(),
        });
        self.events.emit(QueueEvent::Progress);
    }
}

enum Outcome {
    Succeeded,
    Interrupted,
    /// Bulk removal took the task out of the queue mid-repeat
    Removed,
    Exhausted,
}
