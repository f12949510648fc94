// src/handlers/mod.rs

pub mod admin;
pub mod auth;
pub mod bank;
pub mod practice;
pub mod privacy;
pub mod report;
pub mod session;

use crate::{error::AppError, utils::jwt::Claims};

/// Rejects callers that are neither teacher nor admin.
pub(crate) fn require_manager(claims: &Claims) -> Result<(), AppError> {
    if claims.can_manage() {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only teachers can do this".to_string(),
        ))
    }
}
