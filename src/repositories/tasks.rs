use std::sync::Arc;

use super::store::DocumentStore;
use crate::models::tasks::Task;

#[derive(Clone)]
pub struct TaskRepository {
    store: Arc<dyn DocumentStore>,
}

impl TaskRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        TaskRepository { store }
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Option<Task>, anyhow::Error> {
        match self.store.get(&format!("tasks/{task_id}")).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Returns the catalog, seeding the defaults first when it is empty.
    /// The emptiness check is the only gate; concurrent first callers may
    /// both write, which is harmless because the content is identical.
    pub async fn list_or_seed(&self) -> Result<Vec<Task>, anyhow::Error> {
        let existing = self.store.list("tasks").await?;
        if !existing.is_empty() {
            let mut tasks = Vec::new();
            for (_, value) in existing {
                tasks.push(serde_json::from_value::<Task>(value)?);
            }
            tasks.sort_by(|a, b| a.id.cmp(&b.id));
            return Ok(tasks);
        }

        let defaults = default_tasks();
        for task in &defaults {
            self.store
                .set(&format!("tasks/{}", task.id), serde_json::to_value(task)?)
                .await?;
        }
        Ok(defaults)
    }
}

pub fn default_tasks() -> Vec<Task> {
    let catalog = [
        ("task1", "Download App A", "Install and open the app for 30 seconds", 50, "download"),
        ("task2", "Complete Survey", "Answer a quick survey about your preferences", 30, "survey"),
        ("task3", "Watch Video", "Watch a short video advertisement", 20, "video"),
        ("task4", "Sign Up for Newsletter", "Subscribe to our newsletter", 25, "signup"),
        ("task5", "Download App B", "Install and run the app once", 75, "download"),
    ];
    catalog
        .into_iter()
        .map(|(id, title, description, reward, category)| Task {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            reward,
            category: category.to_string(),
            status: "active".to_string(),
        })
        .collect()
}
