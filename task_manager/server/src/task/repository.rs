use crate::entities::task;
use crate::task::{Priority, Status, Task, TaskInput};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::sea_query::{Alias, Expr, Func, SimpleExpr};
use sea_orm::*;

/// Trait defining persistence operations over the task table.
///
/// "Not `DONE`" filters compare with SQL `<>`, so tasks whose status is unset
/// never match them. Lists come back in ID order unless stated otherwise.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Inserts a new task and returns it with its generated ID.
    async fn insert(&self, input: TaskInput, created_at: DateTime<Utc>) -> Result<Task, DbErr>;

    /// Overwrites the editable fields of a task. Returns `None` if the ID does not exist.
    async fn update(
        &self,
        id: u32,
        input: TaskInput,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Task>, DbErr>;

    async fn find_by_id(&self, id: u32) -> Result<Option<Task>, DbErr>;

    /// Deletes a task. Missing IDs are ignored.
    async fn delete_by_id(&self, id: u32) -> Result<(), DbErr>;

    async fn find_all(&self) -> Result<Vec<Task>, DbErr>;

    async fn find_by_status(&self, status: Status) -> Result<Vec<Task>, DbErr>;

    async fn find_by_priority(&self, priority: Priority) -> Result<Vec<Task>, DbErr>;

    async fn find_by_status_and_priority(
        &self,
        status: Status,
        priority: Priority,
    ) -> Result<Vec<Task>, DbErr>;

    async fn find_by_status_not(&self, status: Status) -> Result<Vec<Task>, DbErr>;

    async fn count(&self) -> Result<u64, DbErr>;

    async fn count_by_status(&self, status: Status) -> Result<u64, DbErr>;

    async fn count_by_priority(&self, priority: Priority) -> Result<u64, DbErr>;

    /// Counts tasks that are not `DONE` and were due before `today`.
    async fn count_overdue(&self, today: NaiveDate) -> Result<u64, DbErr>;

    /// Finds the not-`DONE` task with the earliest due date. Undated tasks come last.
    async fn find_next_due(&self) -> Result<Option<Task>, DbErr>;

    /// Lists all tasks by priority (highest first), then due date (earliest
    /// first, undated last), then description length (longest first).
    async fn find_recommended(&self) -> Result<Vec<Task>, DbErr>;
}

/// `TaskRepository` backed by a sea-orm database connection.
#[derive(Clone, Debug)]
pub struct SeaOrmTaskRepository {
    db: DatabaseConnection,
}

impl SeaOrmTaskRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn fetch(&self, select: Select<task::Entity>) -> Result<Vec<Task>, DbErr> {
        let tasks = select
            .order_by_asc(task::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Task::from)
            .collect();
        Ok(tasks)
    }
}

/// `CASE priority WHEN 'HIGH' THEN 3 ... ELSE 0 END`, using `Priority::rank`.
fn priority_rank_expr() -> SimpleExpr {
    let mut case = Expr::case(
        task::Column::Priority.eq(Priority::High),
        i32::from(Priority::High.rank()),
    );
    for priority in [Priority::Medium, Priority::Low] {
        case = case.case(
            task::Column::Priority.eq(priority),
            i32::from(priority.rank()),
        );
    }
    case.finally(0).into()
}

fn description_length_expr() -> SimpleExpr {
    Func::coalesce([
        Func::cust(Alias::new("LENGTH"))
            .arg(Expr::col(task::Column::Description))
            .into(),
        Expr::value(0),
    ])
    .into()
}

#[async_trait]
impl TaskRepository for SeaOrmTaskRepository {
    #[tracing::instrument(skip(self))]
    async fn insert(&self, input: TaskInput, created_at: DateTime<Utc>) -> Result<Task, DbErr> {
        let active_model = task::ActiveModel {
            title: ActiveValue::Set(input.title),
            description: ActiveValue::Set(input.description),
            priority: ActiveValue::Set(input.priority),
            status: ActiveValue::Set(input.status),
            tags: ActiveValue::Set(input.tags),
            created_at: ActiveValue::Set(created_at),
            updated_at: ActiveValue::Set(None),
            due_date: ActiveValue::Set(input.due_date),
            ..Default::default()
        };
        let created_model = active_model.insert(&self.db).await?;
        Ok(Task::from(created_model))
    }

    #[tracing::instrument(skip(self))]
    async fn update(
        &self,
        id: u32,
        input: TaskInput,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Task>, DbErr> {
        let Some(existing) = task::Entity::find_by_id(id as i32).one(&self.db).await? else {
            return Ok(None);
        };

        let mut active_model: task::ActiveModel = existing.into();
        active_model.title = ActiveValue::Set(input.title);
        active_model.description = ActiveValue::Set(input.description);
        active_model.priority = ActiveValue::Set(input.priority);
        active_model.status = ActiveValue::Set(input.status);
        active_model.tags = ActiveValue::Set(input.tags);
        active_model.due_date = ActiveValue::Set(input.due_date);
        active_model.updated_at = ActiveValue::Set(Some(updated_at));
        let updated_model = active_model.update(&self.db).await?;
        Ok(Some(Task::from(updated_model)))
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_id(&self, id: u32) -> Result<Option<Task>, DbErr> {
        let model = task::Entity::find_by_id(id as i32).one(&self.db).await?;
        Ok(model.map(Task::from))
    }

    #[tracing::instrument(skip(self))]
    async fn delete_by_id(&self, id: u32) -> Result<(), DbErr> {
        let result = task::Entity::delete_by_id(id as i32).exec(&self.db).await?;
        if result.rows_affected == 0 {
            tracing::debug!("No task with ID {} to delete", id);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn find_all(&self) -> Result<Vec<Task>, DbErr> {
        self.fetch(task::Entity::find()).await
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_status(&self, status: Status) -> Result<Vec<Task>, DbErr> {
        self.fetch(task::Entity::find().filter(task::Column::Status.eq(status)))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_priority(&self, priority: Priority) -> Result<Vec<Task>, DbErr> {
        self.fetch(task::Entity::find().filter(task::Column::Priority.eq(priority)))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_status_and_priority(
        &self,
        status: Status,
        priority: Priority,
    ) -> Result<Vec<Task>, DbErr> {
        self.fetch(
            task::Entity::find()
                .filter(task::Column::Status.eq(status))
                .filter(task::Column::Priority.eq(priority)),
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_status_not(&self, status: Status) -> Result<Vec<Task>, DbErr> {
        self.fetch(task::Entity::find().filter(task::Column::Status.ne(status)))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn count(&self) -> Result<u64, DbErr> {
        task::Entity::find().count(&self.db).await
    }

    #[tracing::instrument(skip(self))]
    async fn count_by_status(&self, status: Status) -> Result<u64, DbErr> {
        task::Entity::find()
            .filter(task::Column::Status.eq(status))
            .count(&self.db)
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn count_by_priority(&self, priority: Priority) -> Result<u64, DbErr> {
        task::Entity::find()
            .filter(task::Column::Priority.eq(priority))
            .count(&self.db)
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn count_overdue(&self, today: NaiveDate) -> Result<u64, DbErr> {
        task::Entity::find()
            .filter(task::Column::Status.ne(Status::Done))
            .filter(task::Column::DueDate.lt(today))
            .count(&self.db)
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn find_next_due(&self) -> Result<Option<Task>, DbErr> {
        let model = task::Entity::find()
            .filter(task::Column::Status.ne(Status::Done))
            .order_by_asc(Expr::col(task::Column::DueDate).is_null())
            .order_by_asc(task::Column::DueDate)
            .order_by_asc(task::Column::Id)
            .one(&self.db)
            .await?;
        Ok(model.map(Task::from))
    }

    #[tracing::instrument(skip(self))]
    async fn find_recommended(&self) -> Result<Vec<Task>, DbErr> {
        let tasks = task::Entity::find()
            .order_by_desc(priority_rank_expr())
            .order_by_asc(Expr::col(task::Column::DueDate).is_null())
            .order_by_asc(task::Column::DueDate)
            .order_by_desc(description_length_expr())
            .order_by_asc(task::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Task::from)
            .collect();
        Ok(tasks)
    }
}
