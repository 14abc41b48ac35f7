use sea_orm_migration::prelude::*;
use sea_orm_migration::schema::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum Task {
    Table,
    Id,
    Title,
    Description,
    Priority,
    Status,
    Tags,
    CreatedAt,
    UpdatedAt,
    DueDate,
}

/// Long enough for every `Priority` and `Status` variant name.
const ENUM_COLUMN_LEN: u32 = 16;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Task::Table)
                    .if_not_exists()
                    .col(pk_auto(Task::Id))
                    .col(string(Task::Title))
                    .col(text_null(Task::Description))
                    .col(string_len_null(Task::Priority, ENUM_COLUMN_LEN))
                    .col(string_len_null(Task::Status, ENUM_COLUMN_LEN))
                    .col(string_null(Task::Tags))
                    .col(
                        timestamp_with_time_zone(Task::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(Task::UpdatedAt))
                    .col(date_null(Task::DueDate))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Task::Table).to_owned())
            .await
    }
}
