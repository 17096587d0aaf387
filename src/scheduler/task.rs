//! Queued task records and the aggregate counters kept alongside them.

use std::sync::Arc;

use serde::Serialize;

use crate::id::generate_task_id;

/// One queued unit of repeated work.
///
/// `params` is opaque to the scheduler; the handler for `task_type` owns its meaning.
#[derive(Debug)]
pub struct Task<P> {
    pub id: String,
    pub task_type: String,
    /// Handler-derived bucket used for bulk removal and scene progress
    pub group_key: String,
    pub params: Arc<P>,
    /// Successful executions so far
    pub done: u32,
    /// Executions requested
    pub total: u32,
}

impl<P> Clone for Task<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            task_type: self.task_type.clone(),
            group_key: self.group_key.clone(),
            params: Arc::clone(&self.params),
            done: self.done,
            total: self.total,
        }
    }
}

impl<P> Task<P> {
    pub fn new(task_type: impl Into<String>, params: P, total: u32) -> Self {
        Self {
            id: generate_task_id(),
            task_type: task_type.into(),
            group_key: String::new(),
            params: Arc::new(params),
            done: 0,
            total,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.done >= self.total
    }

    pub fn remaining(&self) -> u32 {
        self.total.saturating_sub(self.done)
    }
}

/// Running `done`/`total` sums for a set of tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub done: u32,
    pub total: u32,
}

impl TaskStats {
    pub fn new(done: u32, total: u32) -> Self {
        Self { done, total }
    }

    pub fn add<P>(&mut self, task: &Task<P>) {
        self.done = self.done.saturating_add(task.done);
        self.total = self.total.saturating_add(task.total);
    }

    pub fn subtract<P>(&mut self, task: &Task<P>) {
        self.done = self.done.saturating_sub(task.done);
        self.total = self.total.saturating_sub(task.total);
    }

    pub fn remaining(&self) -> u32 {
        self.total.saturating_sub(self.done)
    }

    pub fn merge(self, other: TaskStats) -> TaskStats {
        TaskStats::new(
            self.done.saturating_add(other.done),
            self.total.saturating_add(other.total),
        )
    }
}

/// Display information for a queued task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskInfo {
    pub name: String,
    pub label: String,
}

/// A cost warning raised by a handler for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CostItem {
    pub scene: String,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task() {
        let task = Task::new("generate", (), 3);
        assert!(task.id.starts_with("task-"));
        assert_eq!(task.done, 0);
        assert_eq!(task.remaining(), 3);
        assert!(!task.is_finished());
    }

    #[test]
    fn test_clone_shares_params() {
        let task = Task::new("generate", vec![1, 2, 3], 1);
        let copy = task.clone();
        assert!(Arc::ptr_eq(&task.params, &copy.params));
        assert_eq!(copy.id, task.id);
    }

    #[test]
    fn test_stats_add_subtract() {
        let mut task = Task::new("generate", (), 5);
        task.done = 2;
        let mut stats = TaskStats::default();
        stats.add(&task);
        assert_eq!(stats, TaskStats::new(2, 5));
        assert_eq!(stats.remaining(), 3);
        stats.subtract(&task);
        assert_eq!(stats, TaskStats::default());
    }

    #[test]
    fn test_stats_saturate_instead_of_overflowing() {
        let task = Task::new("generate", (), u32::MAX);
        let mut stats = TaskStats::default();
        stats.add(&task);
        stats.add(&task);
        assert_eq!(stats, TaskStats::new(0, u32::MAX));
        assert_eq!(stats.merge(TaskStats::new(1, 1)), TaskStats::new(1, u32::MAX));
    }

    #[test]
    fn test_stats_merge() {
        let merged = TaskStats::new(1, 4).merge(TaskStats::new(2, 3));
        assert_eq!(merged, TaskStats::new(3, 7));
    }
}
