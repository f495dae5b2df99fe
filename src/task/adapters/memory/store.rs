//! In-memory task store.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::task::{
    domain::{ExternalTaskId, Task, TaskRecordId, UserId},
    ports::{TaskFieldUpdate, TaskQuery, TaskStore, TaskStoreError, TaskStoreResult},
};

/// Thread-safe in-memory task store.
///
/// Identifiers are assigned sequentially from 1, so ascending identifier
/// order is insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskStore {
    state: Arc<RwLock<InMemoryTaskState>>,
}

#[derive(Debug, Default)]
struct InMemoryTaskState {
    tasks: BTreeMap<TaskRecordId, Task>,
    last_id: i64,
}

impl InMemoryTaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of a stored task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] when the lock is poisoned.
    pub fn snapshot(&self, id: TaskRecordId) -> TaskStoreResult<Option<Task>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.tasks.get(&id).cloned())
    }
}

fn poisoned(err: impl std::fmt::Display) -> TaskStoreError {
    TaskStoreError::persistence(std::io::Error::other(err.to_string()))
}

fn apply_fields(task: &mut Task, fields: &TaskFieldUpdate) {
    let mut data = task.to_persisted();
    if let Some(status) = fields.status {
        data.status = status;
    }
    if let Some(progress) = &fields.progress {
        progress.clone_into(&mut data.progress);
    }
    if let Some(reason) = &fields.fail_reason {
        reason.clone_into(&mut data.fail_reason);
    }
    *task = Task::from_persisted(data);
}

fn owned_by<'a>(
    state: &'a InMemoryTaskState,
    user_id: UserId,
) -> impl Iterator<Item = &'a Task> + 'a {
    state
        .tasks
        .values()
        .filter(move |task| task.user_id() == user_id)
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn get_unfinished_tasks(&self, limit: usize) -> TaskStoreResult<Vec<Task>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .tasks
            .values()
            .filter(|task| !task.is_finished())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_by_task_id(
        &self,
        user_id: UserId,
        task_id: &ExternalTaskId,
    ) -> TaskStoreResult<Option<Task>> {
        let state = self.state.read().map_err(poisoned)?;
        let found = owned_by(&state, user_id)
            .find(|task| task.external_id() == task_id)
            .cloned();
        Ok(found)
    }

    async fn get_by_task_ids(
        &self,
        user_id: UserId,
        task_ids: &[ExternalTaskId],
    ) -> TaskStoreResult<Vec<Task>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(owned_by(&state, user_id)
            .filter(|task| task_ids.contains(task.external_id()))
            .cloned()
            .collect())
    }

    async fn bulk_update_by_id(
        &self,
        ids: &[TaskRecordId],
        fields: &TaskFieldUpdate,
    ) -> TaskStoreResult<u64> {
        let mut state = self.state.write().map_err(poisoned)?;
        let mut changed = 0_u64;
        for id in ids {
            if let Some(task) = state.tasks.get_mut(id) {
                apply_fields(task, fields);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn bulk_update_by_task_id(
        &self,
        task_ids: &[ExternalTaskId],
        fields: &TaskFieldUpdate,
    ) -> TaskStoreResult<u64> {
        let mut state = self.state.write().map_err(poisoned)?;
        let mut changed = 0_u64;
        for task in state.tasks.values_mut() {
            if !task.is_finished() && task_ids.contains(task.external_id()) {
                apply_fields(task, fields);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn insert(&self, task: &Task) -> TaskStoreResult<TaskRecordId> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.last_id += 1;
        let id = TaskRecordId::new(state.last_id);
        let mut stored = task.clone();
        stored.assign_id(id);
        state.tasks.insert(id, stored);
        Ok(id)
    }

    async fn update(&self, task: &Task) -> TaskStoreResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        let slot = state
            .tasks
            .get_mut(&task.id())
            .ok_or(TaskStoreError::NotFound(task.id()))?;
        *slot = task.clone();
        Ok(())
    }

    async fn list_paged(
        &self,
        offset: usize,
        limit: usize,
        filter: &TaskQuery,
    ) -> TaskStoreResult<Vec<Task>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .tasks
            .values()
            .rev()
            .filter(|task| filter.matches(task))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_filtered(&self, filter: &TaskQuery) -> TaskStoreResult<u64> {
        let state = self.state.read().map_err(poisoned)?;
        let count = state
            .tasks
            .values()
            .filter(|task| filter.matches(task))
            .count();
        u64::try_from(count).map_err(TaskStoreError::persistence)
    }
}
