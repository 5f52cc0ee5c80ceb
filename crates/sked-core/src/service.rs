use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, instrument};

use crate::datastore::{DataStore, StoreError};
use crate::datetime::{format_compact_date, is_strictly_after, parse_compact_date};
use crate::recurrence::{self, RecurrenceError, RepeatRule};
use crate::task::Task;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("title is required")]
    MissingTitle,

    #[error("task id is required")]
    MissingId,

    #[error("invalid date format: {value}")]
    InvalidDate { value: String },

    #[error("invalid repeat rule {rule:?}: {source}")]
    InvalidRepeat {
        rule: String,
        #[source]
        source: RecurrenceError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to compute next date for task {id}: {source}")]
    Recurrence {
        id: String,
        #[source]
        source: RecurrenceError,
    },
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound { .. }))
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Task operations on top of an injected [`DataStore`].
#[derive(Debug, Clone)]
pub struct TaskService {
    store: Arc<DataStore>,
}

impl TaskService {
    pub fn new(store: Arc<DataStore>) -> Self {
        Self { store }
    }

    /// Fills in and corrects the date of an incoming task.
    ///
    /// An empty date becomes `now`. A date that is not after `now` is moved
    /// to `now` for one-off tasks, or to the next occurrence for repeating
    /// ones. A non-empty repeat rule must always parse.
    #[instrument(skip(task), fields(title = %task.title, date = %task.date, repeat = %task.repeat))]
    pub fn validate_and_normalize(mut task: Task, now: NaiveDate) -> std::result::Result<Task, ValidationError> {
        if task.title.trim().is_empty() {
            return Err(ValidationError::MissingTitle);
        }

        if task.date.is_empty() {
            task.date = format_compact_date(now);
        }

        let date = parse_compact_date(&task.date)
            .map_err(|err| ValidationError::InvalidDate { value: err.value })?;

        let invalid_repeat = |source| ValidationError::InvalidRepeat {
            rule: task.repeat.clone(),
            source,
        };

        if is_strictly_after(&date, &now) {
            if task.is_repeating() {
                task.repeat.parse::<RepeatRule>().map_err(invalid_repeat)?;
            }
            return Ok(task);
        }

        let normalized = if task.is_repeating() {
            recurrence::next_date(now, &task.date, &task.repeat).map_err(invalid_repeat)?
        } else {
            format_compact_date(now)
        };
        debug!(from = %task.date, to = %normalized, "moved stale date forward");
        task.date = normalized;
        Ok(task)
    }

    #[instrument(skip(self, task), fields(title = %task.title))]
    pub fn add_task(&self, task: Task, now: NaiveDate) -> Result<String> {
        let mut task = Self::validate_and_normalize(task, now)?;
        task.id.clear();
        let id = self.store.insert(&task)?;
        info!(%id, date = %task.date, "added task");
        Ok(id)
    }

    #[instrument(skip(self))]
    pub fn get_task(&self, id: &str) -> Result<Task> {
        Ok(self.store.get(id)?)
    }

    #[instrument(skip(self))]
    pub fn list_tasks(&self, limit: usize) -> Result<Vec<Task>> {
        Ok(self.store.list(limit)?)
    }

    #[instrument(skip(self, task), fields(id = %task.id))]
    pub fn update_task(&self, task: Task, now: NaiveDate) -> Result<()> {
        if task.id.is_empty() {
            return Err(ValidationError::MissingId.into());
        }
        let task = Self::validate_and_normalize(task, now)?;
        self.store.update(&task)?;
        info!(id = %task.id, date = %task.date, "updated task");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn delete_task(&self, id: &str) -> Result<()> {
        self.store.delete(id)?;
        info!(%id, "deleted task");
        Ok(())
    }

    /// Marks a task done: one-off tasks are removed, repeating tasks move
    /// to their next occurrence after `now`.
    #[instrument(skip(self))]
    pub fn complete_task(&self, id: &str, now: NaiveDate) -> Result<()> {
        let task = self.store.get(id)?;

        if !task.is_repeating() {
            self.store.delete(id)?;
            info!(%id, "completed one-off task");
            return Ok(());
        }

        let next = recurrence::next_date(now, &task.date, &task.repeat).map_err(|source| {
            ServiceError::Recurrence {
                id: id.to_string(),
                source,
            }
        })?;
        self.store.update_date(id, &next)?;
        info!(%id, next = %next, "rescheduled repeating task");
        Ok(())
    }

    pub fn next_date(&self, now: NaiveDate, start: &str, rule: &str) -> std::result::Result<String, RecurrenceError> {
        recurrence::next_date(now, start, rule)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use tempfile::{TempDir, tempdir};

    use super::{ServiceError, TaskService, ValidationError};
    use crate::datastore::DataStore;
    use crate::recurrence::RecurrenceError;
    use crate::task::Task;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn service() -> (TempDir, TaskService) {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");
        (temp, TaskService::new(Arc::new(store)))
    }

    fn draft(date: &str, repeat: &str) -> Task {
        Task {
            date: date.to_string(),
            title: "Stretch".to_string(),
            repeat: repeat.to_string(),
            ..Task::default()
        }
    }

    #[test]
    fn empty_date_defaults_to_now() {
        let task = TaskService::validate_and_normalize(draft("", ""), ymd(2024, 1, 10))
            .expect("valid task");
        assert_eq!(task.date, "20240110");
    }

    #[test]
    fn stale_one_off_date_resets_to_now() {
        let task = TaskService::validate_and_normalize(draft("20231201", ""), ymd(2024, 1, 10))
            .expect("valid task");
        assert_eq!(task.date, "20240110");
    }

    #[test]
    fn stale_repeating_date_advances() {
        let task = TaskService::validate_and_normalize(draft("20240101", "d 3"), ymd(2024, 1, 10))
            .expect("valid task");
        assert_eq!(task.date, "20240113");
    }

    #[test]
    fn repeating_date_equal_to_now_advances() {
        let task = TaskService::validate_and_normalize(draft("20240110", "d 5"), ymd(2024, 1, 10))
            .expect("valid task");
        assert_eq!(task.date, "20240115");
    }

    #[test]
    fn future_date_is_kept() {
        let task = TaskService::validate_and_normalize(draft("20240301", "y"), ymd(2024, 1, 10))
            .expect("valid task");
        assert_eq!(task.date, "20240301");
    }

    #[test]
    fn rejects_missing_title_and_bad_date() {
        let mut untitled = draft("20240101", "");
        untitled.title = "   ".to_string();
        assert_eq!(
            TaskService::validate_and_normalize(untitled, ymd(2024, 1, 10)),
            Err(ValidationError::MissingTitle)
        );
        assert_eq!(
            TaskService::validate_and_normalize(draft("01/02/2024", ""), ymd(2024, 1, 10)),
            Err(ValidationError::InvalidDate {
                value: "01/02/2024".to_string()
            })
        );
    }

    #[test]
    fn rejects_bad_rule_even_for_future_dates() {
        let err = TaskService::validate_and_normalize(draft("20250101", "w 1"), ymd(2024, 1, 10))
            .expect_err("unsupported rule");
        assert_eq!(
            err,
            ValidationError::InvalidRepeat {
                rule: "w 1".to_string(),
                source: RecurrenceError::UnsupportedRule {
                    token: "w".to_string()
                },
            }
        );
    }

    #[test]
    fn completing_one_off_task_deletes_it() {
        let (_temp, service) = service();
        let now = ymd(2024, 1, 10);
        let id = service.add_task(draft("20240115", ""), now).expect("add");

        service.complete_task(&id, now).expect("complete");

        let err = service.get_task(&id).expect_err("task removed");
        assert!(err.is_not_found());
    }

    #[test]
    fn completing_repeating_task_moves_date_only() {
        let (_temp, service) = service();
        let now = ymd(2024, 1, 10);
        let mut task = draft("20240115", "d 7");
        task.comment = "morning".to_string();
        let id = service.add_task(task, now).expect("add");

        service.complete_task(&id, ymd(2024, 1, 16)).expect("complete");

        let stored = service.get_task(&id).expect("get");
        assert_eq!(stored.date, "20240122");
        assert_eq!(stored.comment, "morning");
        assert_eq!(stored.repeat, "d 7");
    }

    #[test]
    fn completing_missing_task_is_not_found() {
        let (_temp, service) = service();
        let err = service.complete_task("99", ymd(2024, 1, 10)).expect_err("missing");
        assert!(err.is_not_found());
    }

    #[test]
    fn update_requires_id_and_existing_task() {
        let (_temp, service) = service();
        let now = ymd(2024, 1, 10);

        let err = service.update_task(draft("20240120", ""), now).expect_err("no id");
        assert!(matches!(
            err,
            ServiceError::Validation(ValidationError::MissingId)
        ));

        let mut ghost = draft("20240120", "");
        ghost.id = "12".to_string();
        let err = service.update_task(ghost, now).expect_err("missing");
        assert!(err.is_not_found());
    }

    #[test]
    fn update_replaces_fields() {
        let (_temp, service) = service();
        let now = ymd(2024, 1, 10);
        let id = service.add_task(draft("20240120", ""), now).expect("add");

        let mut edited = draft("20240101", "y");
        edited.id = id.clone();
        edited.title = "Renew passport".to_string();
        service.update_task(edited, now).expect("update");

        let stored = service.get_task(&id).expect("get");
        assert_eq!(stored.title, "Renew passport");
        assert_eq!(stored.date, "20250101");
        assert_eq!(stored.repeat, "y");
    }
}
