use crate::task::Task;
use chrono::{DateTime, Local, SecondsFormat};
use sea_orm::ActiveEnum;

/// Column names of the export, in field declaration order.
pub const CSV_HEADER: [&str; 9] = [
    "id",
    "title",
    "description",
    "priority",
    "status",
    "tags",
    "createdAt",
    "updatedAt",
    "dueDate",
];

/// Renders tasks as comma-separated rows under a header row.
///
/// Values are written as-is: nothing is quoted and embedded commas are not
/// escaped. Absent values become empty fields. Enums use their stored names.
pub fn render_csv(tasks: &[Task]) -> String {
    let mut csv = CSV_HEADER.join(",");
    csv.push('\n');
    for task in tasks {
        let row = [
            task.id().to_string(),
            task.title().to_string(),
            task.description().unwrap_or_default().to_string(),
            task.priority().map(|priority| priority.to_value()).unwrap_or_default(),
            task.status().map(|status| status.to_value()).unwrap_or_default(),
            task.tags().unwrap_or_default().to_string(),
            task.created_at().to_rfc3339_opts(SecondsFormat::Secs, true),
            task.updated_at()
                .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
            task.due_date()
                .map(|date| date.to_string())
                .unwrap_or_default(),
        ];
        csv.push_str(&row.join(","));
        csv.push('\n');
    }
    csv
}

/// File name for an export taken at `now`, e.g. `task_2024-01-31_23-59-59.csv`.
pub fn export_filename(now: DateTime<Local>) -> String {
    format!("task_{}.csv", now.format("%Y-%m-%d_%H-%M-%S"))
}
