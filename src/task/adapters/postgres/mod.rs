//! `PostgreSQL` adapter for task persistence.

mod models;
mod repository;
mod schema;

pub use models::{NewTaskRow, TaskRow};
pub use repository::{PostgresTaskStore, TaskPgPool, decode_batch, new_row, row_to_task};
