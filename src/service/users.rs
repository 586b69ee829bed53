use tracing::{info, warn};

use crate::auth::{hash_password, verify_password};
use crate::fetcher::rpc::NodeClient;
use crate::models::errors::{AuthError, ServiceError};
use crate::models::users::User;
use crate::service::TransactionService;

impl<N: NodeClient> TransactionService<N> {
    /// Creates an account with a fresh random id.
    pub async fn register_user(&self, username: &str, password: &str) -> Result<User, ServiceError> {
        let id: [u8; 16] = rand::random();
        let user = User {
            id: alloy_primitives::hex::encode(id),
            username: username.to_string(),
            password_hash: hash_password(password)?,
        };

        if !self.store.insert_user(&user).await? {
            return Err(AuthError::UserExists(username.to_string()).into());
        }

        info!("Registered user {} with id {}", user.username, user.id);
        Ok(user)
    }

    /// Checks the credentials and issues a token whose subject is the user's id.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<String, ServiceError> {
        let user = self
            .store
            .find_user(username)
            .await?
            .ok_or_else(|| AuthError::UnknownUser(username.to_string()))?;

        if let Err(e) = verify_password(password, &user.password_hash) {
            warn!("Failed login for {}: {}", username, e);
            return Err(e.into());
        }

        Ok(self
            .tokens
            .issue(&user.id, &user.username, self.token_ttl_hours)?)
    }
}
