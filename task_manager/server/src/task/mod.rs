use crate::entities::task;
use chrono::{DateTime, Local, NaiveDate, TimeDelta, Utc};
use sea_orm::{DatabaseConnection, Iterable};
use std::sync::Arc;

pub use crate::entities::task::{Priority, Status};
pub use repository::{SeaOrmTaskRepository, TaskRepository};
pub use search::{SearchCriteria, SortKey};

pub mod api;
pub mod export;
pub mod report;
pub mod repository;
pub mod search;

#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Task {
    id: u32,
    title: String,
    description: Option<String>,
    priority: Option<Priority>,
    status: Option<Status>,
    tags: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    due_date: Option<NaiveDate>,
}

impl Task {
    /// Returns the ID of the task.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn priority(&self) -> Option<Priority> {
        self.priority
    }

    pub fn status(&self) -> Option<Status> {
        self.status
    }

    /// Returns the free-text tags of the task.
    pub fn tags(&self) -> Option<&str> {
        self.tags.as_deref()
    }

    /// Returns when the task was created. Never changes after creation.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the task was last updated, if it ever was.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    /// Ranking weight of the task's priority; tasks without one rank below `LOW`.
    pub fn priority_rank(&self) -> u8 {
        self.priority.map_or(0, Priority::rank)
    }
}

impl From<task::Model> for Task {
    fn from(model: task::Model) -> Self {
        Self {
            id: model.id as u32,
            title: model.title,
            description: model.description,
            priority: model.priority,
            status: model.status,
            tags: model.tags,
            created_at: model.created_at,
            updated_at: model.updated_at,
            due_date: model.due_date,
        }
    }
}

/// The client-editable fields of a task, used for both creation and update.
#[derive(Debug, PartialEq, Clone, Eq, Default)]
pub struct TaskInput {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<Status>,
    pub tags: Option<String>,
    pub due_date: Option<NaiveDate>,
}

impl TaskInput {
    /// Checks the input against a task created at `created_at`.
    ///
    /// # Returns
    ///
    /// `Ok(())` when the title is not blank and the due date, if any, is not
    /// earlier than the local calendar date of `created_at`.
    pub fn validate(&self, created_at: DateTime<Utc>) -> Result<(), TaskServiceError> {
        if self.title.trim().is_empty() {
            return Err(TaskServiceError::BlankTitle);
        }
        if let Some(due_date) = self.due_date {
            let created_on = created_at.with_timezone(&Local).date_naive();
            if due_date < created_on {
                return Err(TaskServiceError::DueDateBeforeCreation {
                    due_date,
                    created_on,
                });
            }
        }
        Ok(())
    }
}

/// Error type for TaskService operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskServiceError {
    /// The title is missing or only whitespace.
    #[error("Title must not be empty")]
    BlankTitle,
    /// The due date falls before the day the task was created.
    #[error("Due date {due_date} must not be earlier than creation date {created_on}")]
    DueDateBeforeCreation {
        due_date: NaiveDate,
        created_on: NaiveDate,
    },
    /// Represents a task not found error.
    #[error("Task with ID {0} not found")]
    TaskNotFound(u32),
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl TaskServiceError {
    /// Whether the error was caused by invalid client input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TaskServiceError::BlankTitle | TaskServiceError::DueDateBeforeCreation { .. }
        )
    }
}

/// Number of tasks per priority. Tasks without a priority are not counted.
#[derive(Debug, PartialEq, Clone, Copy, Eq, Default)]
pub struct PriorityCounts {
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

/// Aggregate snapshot of the task table.
///
/// The counts come from independent queries, so under concurrent writes they
/// may not agree with each other. `pending` is always `total - completed`.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct TaskSummary {
    pub total: u64,
    pub completed: u64,
    pub pending: u64,
    pub by_priority: PriorityCounts,
    pub overdue: u64,
    pub next_due_task: Option<Task>,
}

/// Router state shared by the task handlers.
#[derive(Clone)]
pub struct TaskState {
    pub service: Arc<TaskService<SeaOrmTaskRepository>>,
}

impl TaskState {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            service: Arc::new(TaskService::new(SeaOrmTaskRepository::new(db))),
        }
    }
}

pub struct TaskService<R> {
    repository: R,
}

impl<R: TaskRepository> TaskService<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    /// Creates a new task after validating it against the current time.
    ///
    /// # Returns
    ///
    /// A `Result` containing the stored `Task` with its generated ID and
    /// creation time, or a validation error if the input is rejected.
    #[tracing::instrument(skip(self))]
    pub async fn create_task(&self, input: TaskInput) -> Result<Task, TaskServiceError> {
        let created_at = Utc::now();
        input.validate(created_at)?;
        let task = self.repository.insert(input, created_at).await?;
        tracing::info!(task_id = task.id(), "Created task");
        Ok(task)
    }

    /// Retrieves a task by its ID, or `None` if it does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_task_by_id(&self, id: u32) -> Result<Option<Task>, TaskServiceError> {
        Ok(self.repository.find_by_id(id).await?)
    }

    /// Overwrites the editable fields of an existing task and stamps its update time.
    ///
    /// # Arguments
    ///
    /// * `id` - The ID of the task to update.
    /// * `input` - The new field values. Absent optional fields clear the stored value.
    ///
    /// # Returns
    ///
    /// A `Result` containing the updated `Task`, `TaskNotFound` if no task has
    /// the given ID, or a validation error.
    #[tracing::instrument(skip(self))]
    pub async fn update_task(&self, id: u32, input: TaskInput) -> Result<Task, TaskServiceError> {
        let existing = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or(TaskServiceError::TaskNotFound(id))?;
        input.validate(existing.created_at())?;

        let updated_at = next_update_stamp(&existing, Utc::now());
        let task = self
            .repository
            .update(id, input, updated_at)
            .await?
            .ok_or(TaskServiceError::TaskNotFound(id))?;
        tracing::info!(task_id = id, "Updated task");
        Ok(task)
    }

    /// Deletes a task by its ID. Deleting a missing task is not an error.
    #[tracing::instrument(skip(self))]
    pub async fn delete_task(&self, id: u32) -> Result<(), TaskServiceError> {
        self.repository.delete_by_id(id).await?;
        Ok(())
    }

    /// Lists tasks, optionally filtered by status and/or priority.
    #[tracing::instrument(skip(self))]
    pub async fn list_tasks(
        &self,
        status: Option<Status>,
        priority: Option<Priority>,
    ) -> Result<Vec<Task>, TaskServiceError> {
        let tasks = match (status, priority) {
            (Some(status), Some(priority)) => {
                self.repository
                    .find_by_status_and_priority(status, priority)
                    .await?
            }
            (Some(status), None) => self.repository.find_by_status(status).await?,
            (None, Some(priority)) => self.repository.find_by_priority(priority).await?,
            (None, None) => self.repository.find_all().await?,
        };
        tracing::debug!(count = tasks.len(), "Listed tasks");
        Ok(tasks)
    }

    /// Searches all tasks in memory using the given criteria.
    #[tracing::instrument(skip(self))]
    pub async fn search_tasks(
        &self,
        criteria: &SearchCriteria,
    ) -> Result<Vec<Task>, TaskServiceError> {
        let tasks = self.repository.find_all().await?;
        let matched = criteria.apply(tasks);
        tracing::debug!(count = matched.len(), "Searched tasks");
        Ok(matched)
    }

    /// Builds the task summary.
    #[tracing::instrument(skip(self))]
    pub async fn get_summary(&self) -> Result<TaskSummary, TaskServiceError> {
        let total = self.repository.count().await?;
        let completed = self.repository.count_by_status(Status::Done).await?;

        let mut by_priority = PriorityCounts::default();
        for priority in Priority::iter() {
            let count = self.repository.count_by_priority(priority).await?;
            match priority {
                Priority::High => by_priority.high = count,
                Priority::Medium => by_priority.medium = count,
                Priority::Low => by_priority.low = count,
            }
        }

        let today = Local::now().date_naive();
        let overdue = self.repository.count_overdue(today).await?;
        let next_due_task = self.repository.find_next_due().await?;

        Ok(TaskSummary {
            total,
            completed,
            pending: total.saturating_sub(completed),
            by_priority,
            overdue,
            next_due_task,
        })
    }

    /// Returns all tasks in recommendation order.
    #[tracing::instrument(skip(self))]
    pub async fn get_recommended(&self) -> Result<Vec<Task>, TaskServiceError> {
        Ok(self.repository.find_recommended().await?)
    }

    /// Returns every task whose status is not `DONE`.
    #[tracing::instrument(skip(self))]
    pub async fn get_pending_tasks(&self) -> Result<Vec<Task>, TaskServiceError> {
        Ok(self.repository.find_by_status_not(Status::Done).await?)
    }
}

/// Picks an update time strictly after the task's previous stamp.
fn next_update_stamp(existing: &Task, now: DateTime<Utc>) -> DateTime<Utc> {
    let previous = existing.updated_at().unwrap_or(existing.created_at());
    if now > previous {
        now
    } else {
        previous + TimeDelta::microseconds(1)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::task::repository::MockTaskRepository;
    use chrono::TimeZone;
    use mockall::predicate::eq;

    pub(crate) fn model(id: i32, title: &str) -> task::Model {
        task::Model {
            id,
            title: title.to_string(),
            description: None,
            priority: None,
            status: None,
            tags: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            updated_at: None,
            due_date: None,
        }
    }

    fn input(title: &str) -> TaskInput {
        TaskInput {
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn can_reject_blank_title() {
        let result = input("   ").validate(Utc::now());
        assert!(matches!(result, Err(TaskServiceError::BlankTitle)));
    }

    #[test]
    fn can_reject_due_date_before_creation_day() {
        let created_at = Utc::now();
        let yesterday = created_at.with_timezone(&Local).date_naive() - TimeDelta::days(1);
        let task_input = TaskInput {
            due_date: Some(yesterday),
            ..input("Pay rent")
        };

        let result = task_input.validate(created_at);

        assert!(matches!(
            result,
            Err(TaskServiceError::DueDateBeforeCreation { .. })
        ));
    }

    #[test]
    fn can_accept_due_date_on_creation_day() {
        let created_at = Utc::now();
        let task_input = TaskInput {
            due_date: Some(created_at.with_timezone(&Local).date_naive()),
            ..input("Pay rent")
        };

        assert!(task_input.validate(created_at).is_ok());
    }

    #[test]
    fn can_advance_update_stamp_past_previous_one() {
        let existing = Task::from(task::Model {
            updated_at: Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()),
            ..model(1, "Clock skew")
        });
        let stale_now = Utc.with_ymd_and_hms(2029, 1, 1, 0, 0, 0).unwrap();

        let stamp = next_update_stamp(&existing, stale_now);

        assert!(stamp > existing.updated_at().unwrap());
    }

    #[tokio::test]
    async fn can_create_task_with_valid_input() {
        let mut repository = MockTaskRepository::new();
        repository
            .expect_insert()
            .times(1)
            .returning(|input, created_at| {
                Ok(Task::from(task::Model {
                    created_at,
                    ..model(7, &input.title)
                }))
            });
        let service = TaskService::new(repository);

        let created = service.create_task(input("Buy milk")).await.unwrap();

        assert_eq!(created.id(), 7);
        assert_eq!(created.title(), "Buy milk");
    }

    #[tokio::test]
    async fn can_reject_invalid_task_without_touching_the_store() {
        let mut repository = MockTaskRepository::new();
        repository.expect_insert().never();
        let service = TaskService::new(repository);

        let result = service.create_task(input("")).await;

        assert!(matches!(result, Err(TaskServiceError::BlankTitle)));
    }

    #[tokio::test]
    async fn can_report_not_found_when_updating_missing_task() {
        let mut repository = MockTaskRepository::new();
        repository
            .expect_find_by_id()
            .with(eq(42))
            .returning(|_| Ok(None));
        repository.expect_update().never();
        let service = TaskService::new(repository);

        let result = service.update_task(42, input("Ghost")).await;

        assert!(matches!(result, Err(TaskServiceError::TaskNotFound(42))));
    }

    #[tokio::test]
    async fn can_update_existing_task_with_fresh_stamp() {
        let mut repository = MockTaskRepository::new();
        repository
            .expect_find_by_id()
            .with(eq(3))
            .returning(|id| Ok(Some(Task::from(model(id as i32, "Old title")))));
        repository
            .expect_update()
            .times(1)
            .returning(|id, input, updated_at| {
                Ok(Some(Task::from(task::Model {
                    updated_at: Some(updated_at),
                    ..model(id as i32, &input.title)
                })))
            });
        let service = TaskService::new(repository);

        let updated = service.update_task(3, input("New title")).await.unwrap();

        assert_eq!(updated.title(), "New title");
        assert!(updated.updated_at().unwrap() > updated.created_at());
    }

    #[tokio::test]
    async fn can_list_tasks_with_one_query_per_filter_combination() {
        let mut repository = MockTaskRepository::new();
        repository
            .expect_find_by_status_and_priority()
            .with(eq(Status::Done), eq(Priority::High))
            .times(1)
            .returning(|_, _| Ok(vec![]));
        repository
            .expect_find_by_status()
            .with(eq(Status::Todo))
            .times(1)
            .returning(|_| Ok(vec![]));
        repository
            .expect_find_by_priority()
            .with(eq(Priority::Low))
            .times(1)
            .returning(|_| Ok(vec![]));
        repository
            .expect_find_all()
            .times(1)
            .returning(|| Ok(vec![Task::from(model(1, "Only"))]));
        let service = TaskService::new(repository);

        service
            .list_tasks(Some(Status::Done), Some(Priority::High))
            .await
            .unwrap();
        service.list_tasks(Some(Status::Todo), None).await.unwrap();
        service.list_tasks(None, Some(Priority::Low)).await.unwrap();
        let all = service.list_tasks(None, None).await.unwrap();

        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn can_compute_pending_from_total_and_completed() {
        let mut repository = MockTaskRepository::new();
        repository.expect_count().returning(|| Ok(5));
        repository
            .expect_count_by_status()
            .with(eq(Status::Done))
            .returning(|_| Ok(2));
        repository
            .expect_count_by_priority()
            .times(3)
            .returning(|priority| {
                Ok(match priority {
                    Priority::High => 2,
                    Priority::Medium => 1,
                    Priority::Low => 1,
                })
            });
        repository.expect_count_overdue().returning(|_| Ok(1));
        repository
            .expect_find_next_due()
            .returning(|| Ok(Some(Task::from(model(4, "Soonest")))));
        let service = TaskService::new(repository);

        let summary = service.get_summary().await.unwrap();

        assert_eq!(summary.pending, summary.total - summary.completed);
        assert_eq!(summary.pending, 3);
        assert_eq!(
            summary.by_priority,
            PriorityCounts {
                high: 2,
                medium: 1,
                low: 1
            }
        );
        assert_eq!(summary.overdue, 1);
        assert_eq!(summary.next_due_task.map(|task| task.id()), Some(4));
    }

    #[tokio::test]
    async fn can_fetch_pending_tasks_excluding_done() {
        let mut repository = MockTaskRepository::new();
        repository
            .expect_find_by_status_not()
            .with(eq(Status::Done))
            .times(1)
            .returning(|_| Ok(vec![Task::from(model(1, "Open"))]));
        let service = TaskService::new(repository);

        let pending = service.get_pending_tasks().await.unwrap();

        assert_eq!(pending.len(), 1);
    }
}
