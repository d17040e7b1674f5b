use std::time::SystemTime;
use uuid::Uuid;

use crate::db::{normalize_email, DaoError, UserStore};
use crate::models::user::{NewUser, User};

pub struct Dao {
    store: UserStore,
}

impl Dao {
    pub fn new(store: &UserStore) -> Self {
        Self {
            store: store.clone(),
        }
    }

    pub fn create_user(&self, new_user: NewUser) -> Result<User, DaoError> {
        let email = normalize_email(new_user.email);
        let mut users = self
            .store
            .users
            .write()
            .map_err(|_| DaoError::LockPoisoned)?;

        if users.contains_key(&email) {
            return Err(DaoError::AlreadyExists);
        }

        let user = User {
            id: Uuid::now_v7(),
            name: String::from(new_user.name.trim()),
            email: email.clone(),
            password_hash: String::from(new_user.password_hash),
            created_timestamp: SystemTime::now(),
        };

        users.insert(email, user.clone());
        Ok(user)
    }

    pub fn get_user_by_email(&self, user_email: &str) -> Result<User, DaoError> {
        let users = self
            .store
            .users
            .read()
            .map_err(|_| DaoError::LockPoisoned)?;

        users
            .get(&normalize_email(user_email))
            .cloned()
            .ok_or(DaoError::NotFound)
    }

    pub fn get_user_by_id(&self, user_id: Uuid) -> Result<User, DaoError> {
        let users = self
            .store
            .users
            .read()
            .map_err(|_| DaoError::LockPoisoned)?;

        users
            .values()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or(DaoError::NotFound)
    }
}
