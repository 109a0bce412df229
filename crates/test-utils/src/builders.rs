#![allow(dead_code)]

use deploydag::config::{RawTask, TaskSet};

/// Builder for a `TaskSet` to simplify test setup.
pub struct TaskSetBuilder {
    tasks: Vec<RawTask>,
}

impl TaskSetBuilder {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    pub fn with_task(mut self, task: RawTask) -> Self {
        self.tasks.push(task);
        self
    }

    /// The raw records, for tests exercising validation itself.
    pub fn raw(self) -> Vec<RawTask> {
        self.tasks
    }

    pub fn build(self) -> TaskSet {
        TaskSet::try_from(self.tasks).expect("Failed to build valid task set from builder")
    }
}

impl Default for TaskSetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a single `RawTask`.
pub struct TaskBuilder {
    task: RawTask,
}

impl TaskBuilder {
    /// A task named `name` that provides `<name>_done`, so it is valid on its
    /// own.
    pub fn new(name: &str) -> Self {
        Self {
            task: RawTask {
                name: Some(name.to_string()),
                provides: vec![format!("{name}_done")],
                ..RawTask::default()
            },
        }
    }

    /// A task with no name at all.
    pub fn unnamed() -> Self {
        Self {
            task: RawTask {
                name: None,
                provides: vec!["unnamed_done".to_string()],
                ..RawTask::default()
            },
        }
    }

    /// Replace the default `provides` entry with `resources`.
    pub fn provides(mut self, resources: &[&str]) -> Self {
        self.task.provides = resources.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn requires_var(mut self, var: &str) -> Self {
        self.task.requires_vars.push(var.to_string());
        self
    }

    pub fn triggers(mut self, task: &str) -> Self {
        self.task.triggers.push(task.to_string());
        self
    }

    pub fn watch(mut self, pattern: &str) -> Self {
        self.task.watch_patterns.push(pattern.to_string());
        self
    }

    pub fn depends_on(mut self, resource: &str) -> Self {
        self.task.depends_on.push(resource.to_string());
        self
    }

    pub fn build(self) -> RawTask {
        self.task
    }
}
