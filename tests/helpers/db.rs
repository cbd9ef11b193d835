use std::sync::Arc;

use grantry::permissions::service::Backends;
use grantry::permissions::types::Permission;
use grantry::permissions::PermissionService;
use grantry::settings::Database;
use grantry::storage::{self, SqlStore};
use sea_orm::DatabaseConnection;
use sea_orm_migration::MigratorTrait;
use tempfile::NamedTempFile;

/// Test database with automatic cleanup
pub struct TestDb {
    connection: DatabaseConnection,
    _temp_file: NamedTempFile,
}

impl TestDb {
    /// Create a new test database with migrations applied
    pub async fn new() -> Self {
        // Create temporary SQLite database file
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_path = temp_file.path().to_str().expect("Invalid temp file path");
        let db_url = format!("sqlite://{}?mode=rwc", db_path);

        // Connect with the default pool settings
        let connection = storage::init(&Database {
            url: db_url,
            ..Database::default()
        })
        .await
        .expect("Failed to connect to test database");

        // Run migrations
        migration::Migrator::up(&connection, None)
            .await
            .expect("Failed to run migrations");

        Self {
            connection,
            _temp_file: temp_file,
        }
    }

    pub fn store(&self) -> Arc<SqlStore> {
        Arc::new(SqlStore::new(self.connection.clone()))
    }
}

/// A service over `store` with the system permissions bootstrapped
pub async fn test_service(store: &Arc<SqlStore>) -> PermissionService {
    let service = PermissionService::new(Backends::from_store(store.clone()))
        .with_base_url("http://grantry.test/");
    service
        .bootstrap_system_permissions()
        .await
        .expect("Failed to bootstrap system permissions");
    service
}

pub async fn seed_permission(service: &PermissionService, name: &str) -> Permission {
    service
        .create_permission(name, &format!("{name} access"))
        .await
        .expect("Failed to create permission")
}
