//! User directory.

use common::UserId;
use store::{NewUser, Role, User, UserStore};

use crate::error::{DomainError, Result};

#[derive(Debug, Clone)]
pub struct UserService<S> {
    store: S,
}

impl<S: UserStore> UserService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Registers a user. E-mail addresses are stored lower-cased.
    #[tracing::instrument(skip(self))]
    pub async fn register(&self, email: &str, role: Role) -> Result<User> {
        let email = email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(DomainError::InvalidInput(format!(
                "'{email}' is not an e-mail address"
            )));
        }

        let user = self.store.create_user(NewUser { email, role }).await?;
        tracing::info!(user_id = %user.id, role = user.role.as_str(), "user registered");
        Ok(user)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, user_id: UserId) -> Result<Option<User>> {
        Ok(self.store.get_user(user_id).await?)
    }
}
