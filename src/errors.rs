use miette::Diagnostic;
use thiserror::Error;

use crate::permissions::PermissionError;

#[derive(Debug, Error, Diagnostic)]
pub enum GrantryError {
    #[error("Database error: {0}")]
    #[diagnostic(code(grantry::db))]
    Db(#[from] sea_orm::DbErr),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Permission(#[from] PermissionError),
}
