//! Strategy interface implemented once per task type.

use async_trait::async_trait;

use crate::error::Result;
use crate::scheduler::estimator::TimeEstimator;
use crate::scheduler::run::TaskRun;
use crate::scheduler::task::{CostItem, Task, TaskInfo};

/// Executes one kind of task for the [`TaskQueue`](crate::scheduler::TaskQueue).
///
/// The queue never looks inside `P`; everything type-specific lives here: how one attempt
/// runs, how many attempts are allowed, how long to wait before each, and which group a task
/// belongs to.
#[async_trait]
pub trait TaskHandler<P>: Send + Sync
where
    P: Send + Sync + 'static,
{
    /// Key tasks of this handler are queued under.
    fn task_type(&self) -> &str;

    fn create_time_estimator(&self) -> TimeEstimator;

    /// Run one attempt. `Ok(true)` is a success, `Ok(false)` and `Err` are failures.
    ///
    /// Return [`LoomError::IpChanged`](crate::error::LoomError::IpChanged) to stop the run
    /// without further retries.
    async fn handle_task(&self, task: &Task<P>, run: &TaskRun) -> Result<bool>;

    fn num_tries(&self, task: &Task<P>) -> u32;

    /// Wait before attempt `attempt` (0-based).
    async fn handle_delay(&self, task: &Task<P>, attempt: u32);

    fn group_key(&self, task: &Task<P>) -> String;

    fn info(&self, task: &Task<P>) -> TaskInfo {
        TaskInfo {
            name: task.group_key.clone(),
            label: self.task_type().to_string(),
        }
    }

    fn calculate_cost(&self, _task: &Task<P>) -> Vec<CostItem> {
        Vec::new()
    }
}
