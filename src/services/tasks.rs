use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::earnings::EarningsRequest;
use super::{RequestHandler, Service, ServiceError};
use crate::models::tasks::{Task, TaskCompletion};
use crate::repositories::store::DocumentStore;
use crate::repositories::tasks::TaskRepository;
use crate::repositories::users::UserRepository;

pub enum TasksRequest {
    List {
        response: oneshot::Sender<Result<Vec<Task>, ServiceError>>,
    },
    Complete {
        user_id: String,
        task_id: String,
        response: oneshot::Sender<Result<TaskCompletion, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct TasksRequestHandler {
    tasks: TaskRepository,
    users: UserRepository,
    earnings_channel: mpsc::Sender<EarningsRequest>,
    allow_repeat_completion: bool,
}

impl TasksRequestHandler {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        earnings_channel: mpsc::Sender<EarningsRequest>,
        allow_repeat_completion: bool,
    ) -> Self {
        TasksRequestHandler {
            tasks: TaskRepository::new(store.clone()),
            users: UserRepository::new(store),
            earnings_channel,
            allow_repeat_completion,
        }
    }

    async fn list(&self) -> Result<Vec<Task>, ServiceError> {
        self.tasks
            .list_or_seed()
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))
    }

    /// The reward always comes from the catalog record, never from the
    /// caller. Repeat completions are a policy decision; when disallowed,
    /// the conditional completion marker is written before any credit.
    async fn complete(&self, user_id: &str, task_id: &str) -> Result<TaskCompletion, ServiceError> {
        let task = self
            .tasks
            .get_task(task_id)
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))?
            .ok_or_else(|| ServiceError::NotFound("Task".to_string()))?;

        if !self.allow_repeat_completion {
            let first_time = self
                .users
                .mark_task_completed(user_id, task_id)
                .await
                .map_err(|e| ServiceError::Store(e.to_string()))?;
            if !first_time {
                return Err(ServiceError::Validation(format!(
                    "Task {task_id} already completed"
                )));
            }
        }

        let (credit_tx, credit_rx) = oneshot::channel();
        self.earnings_channel
            .send(EarningsRequest::Credit {
                user_id: user_id.to_string(),
                amount: task.reward,
                kind: format!("Task: {}", task.title),
                task_id: Some(task_id.to_string()),
                response: credit_tx,
            })
            .await
            .map_err(|e| ServiceError::Communication("Tasks => Earnings".to_string(), e.to_string()))?;

        let outcome = credit_rx
            .await
            .map_err(|e| ServiceError::Communication("Earnings => Tasks".to_string(), e.to_string()))??;

        let tasks_completed = self
            .users
            .increment_tasks_completed(user_id)
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))?;

        Ok(TaskCompletion {
            earning: outcome.earning,
            new_balance: outcome.new_balance,
            tasks_completed,
        })
    }
}

#[async_trait]
impl RequestHandler<TasksRequest> for TasksRequestHandler {
    async fn handle_request(&self, request: TasksRequest) {
        match request {
            TasksRequest::List { response } => {
                let result = self.list().await;
                let _ = response.send(result);
            }
            TasksRequest::Complete {
                user_id,
                task_id,
                response,
            } => {
                let result = self.complete(&user_id, &task_id).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct TasksService;

impl TasksService {
    pub fn new() -> Self {
        TasksService {}
    }
}

#[async_trait]
impl Service<TasksRequest, TasksRequestHandler> for TasksService {}
