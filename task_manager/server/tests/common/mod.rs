#![allow(dead_code)] // each test binary uses a different subset of these helpers

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use migration::MigratorTrait;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use task_manager_server::task::{SeaOrmTaskRepository, Task, TaskInput, TaskRepository};
use testcontainers_modules::testcontainers::runners::AsyncRunner;
use testcontainers_modules::{postgres, testcontainers};

/// Opens a migrated in-memory SQLite database.
///
/// The pool is pinned to a single connection, since every SQLite in-memory
/// connection sees its own database.
pub async fn setup_sqlite_db() -> anyhow::Result<DatabaseConnection> {
    // Allow multiple calls to init for tests.
    let _ = tracing_subscriber::fmt().with_env_filter("debug").try_init();
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1);
    let db = Database::connect(options).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

pub async fn setup_container() -> anyhow::Result<testcontainers::ContainerAsync<postgres::Postgres>>
{
    let container = postgres::Postgres::default().start().await?;
    Ok(container)
}

pub async fn setup_postgres_db(
    container: &testcontainers::ContainerAsync<postgres::Postgres>,
) -> anyhow::Result<DatabaseConnection> {
    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(5432).await?;
    let db_url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);
    let db = Database::connect(&db_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Creation time used for fixtures, early enough for any due date in the tests.
pub fn fixture_created_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 12, 1, 9, 0, 0).unwrap()
}

pub fn input(title: &str) -> TaskInput {
    TaskInput {
        title: title.to_string(),
        ..Default::default()
    }
}

/// Stores a task directly through the repository, bypassing validation.
pub async fn insert_task(db: &DatabaseConnection, input: TaskInput) -> Task {
    SeaOrmTaskRepository::new(db.clone())
        .insert(input, fixture_created_at())
        .await
        .expect("Failed to insert task")
}
