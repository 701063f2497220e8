pub mod database;
pub mod sqlite;

pub use database::Database;
