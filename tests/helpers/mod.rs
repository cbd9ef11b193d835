pub mod builders;
pub mod db;

pub use builders::GroupBuilder;
pub use db::{seed_permission, test_service, TestDb};
