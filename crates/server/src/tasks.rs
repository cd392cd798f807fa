//! Background task dispatch.
//!
//! Training and batch generation run for minutes, so callers submit them
//! as jobs and poll for the outcome instead of blocking. The dispatcher
//! runs each job on tokio's blocking pool and tracks a tiny state
//! machine per task: Pending until the pool picks it up, Started while
//! the job runs, then Success with a JSON payload or Failure with the
//! error message.
//!
//! Nothing here enforces "one training job per partition at a time" —
//! that is a deployment convention, and a second concurrent submit is
//! merely wasteful, not corrupting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

pub type TaskId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskState {
    Pending,
    Started,
    Success,
    Failure,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failure)
    }
}

/// Snapshot of one submitted job.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub state: TaskState,
    /// Job output on success, error message on failure.
    pub result: Option<Value>,
}

#[derive(Default)]
pub struct Dispatcher {
    tasks: Arc<Mutex<HashMap<TaskId, Task>>>,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit a job to the blocking pool and return its task id
    /// immediately. Must be called from within a tokio runtime.
    pub fn submit<F>(&self, name: &str, job: F) -> TaskId
    where
        F: FnOnce() -> Result<Value> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let name = name.to_string();

        {
            let mut tasks = self.tasks.lock().expect("task table lock poisoned");
            tasks.insert(
                id,
                Task {
                    id,
                    state: TaskState::Pending,
                    result: None,
                },
            );
        }

        let tasks = Arc::clone(&self.tasks);
        tokio::task::spawn_blocking(move || {
            set_state(&tasks, id, TaskState::Started, None);
            info!("task {id} ({name}) started");

            match job() {
                Ok(value) => {
                    info!("task {id} ({name}) succeeded");
                    set_state(&tasks, id, TaskState::Success, Some(value));
                }
                Err(e) => {
                    error!("task {id} ({name}) failed: {e:#}");
                    set_state(&tasks, id, TaskState::Failure, Some(Value::String(format!("{e:#}"))));
                }
            }
        });

        id
    }

    /// Snapshot of a task's current state, or `None` for an unknown id.
    pub fn poll(&self, id: TaskId) -> Option<Task> {
        self.tasks
            .lock()
            .expect("task table lock poisoned")
            .get(&id)
            .cloned()
    }

    /// Wait for a task to reach a terminal state.
    pub async fn wait(&self, id: TaskId, interval: Duration) -> Option<Task> {
        loop {
            match self.poll(id) {
                Some(task) if task.state.is_terminal() => return Some(task),
                Some(_) => tokio::time::sleep(interval).await,
                None => return None,
            }
        }
    }
}

fn set_state(tasks: &Mutex<HashMap<TaskId, Task>>, id: TaskId, state: TaskState, result: Option<Value>) {
    let mut tasks = tasks.lock().expect("task table lock poisoned");
    if let Some(task) = tasks.get_mut(&id) {
        task.state = state;
        if result.is_some() {
            task.result = result;
        }
    }
}
