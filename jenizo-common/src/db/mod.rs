use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::models::user::User;

pub mod user;

/// Users keyed by normalized email. Contents live only as long as the process.
#[derive(Clone, Default)]
pub struct UserStore {
    users: Arc<RwLock<HashMap<String, User>>>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum DaoError {
    LockPoisoned,
    AlreadyExists,
    NotFound,
}

impl std::error::Error for DaoError {}

impl fmt::Display for DaoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaoError::LockPoisoned => {
                write!(f, "DaoError: User store lock was poisoned")
            }
            DaoError::AlreadyExists => {
                write!(f, "DaoError: A record with that key already exists")
            }
            DaoError::NotFound => {
                write!(f, "DaoError: Record not found")
            }
        }
    }
}

/// Lowercased and trimmed, the form emails are stored and looked up in.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
