//! The authentication collaborator.
//!
//! Validates registration credentials against the configured users and
//! hands back the authenticated [`Principal`]. The broker trusts the
//! principal for audit attribution only. A failed attempt is delayed
//! before the rejection goes out, to slow credential guessing.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use hermod_core::Principal;

use crate::config::UserConfig;

/// How long a failed login waits before the rejection.
const FAILED_LOGIN_DELAY: Duration = Duration::from_secs(3);

/// Credentials presented at registration.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Login name.
    pub username: String,
    /// Password.
    pub password: String,
}

/// Authentication failure. Deliberately carries no detail about which part
/// of the credentials was wrong.
#[derive(Debug, thiserror::Error)]
#[error("invalid credentials")]
pub struct AuthError;

/// Username/password authentication over the configured user table.
pub struct AuthService {
    users: HashMap<String, UserConfig>,
    failure_delay: Duration,
}

impl AuthService {
    /// Build the service from configured users.
    #[must_use]
    pub fn new(users: Vec<UserConfig>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.name.clone(), u)).collect(),
            failure_delay: FAILED_LOGIN_DELAY,
        }
    }

    /// Override the failure delay; tests use a short one.
    #[must_use]
    pub fn with_failure_delay(mut self, delay: Duration) -> Self {
        self.failure_delay = delay;
        self
    }

    /// Authenticate credentials, returning the principal on success.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<Principal, AuthError> {
        if let Some(user) = self.users.get(&credentials.username) {
            if user.password == credentials.password {
                return Ok(Principal::new(user.id.clone(), user.name.clone()));
            }
        }

        warn!(username = %credentials.username, "failed login attempt");
        tokio::time::sleep(self.failure_delay).await;
        Err(AuthError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_service() -> AuthService {
        AuthService::new(vec![UserConfig {
            id: "user_1".into(),
            name: "root".into(),
            password: "secret".into(),
        }])
        .with_failure_delay(Duration::from_millis(1))
    }

    fn credentials(username: &str, password: &str) -> Credentials {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn valid_credentials_yield_the_principal() {
        let auth = make_service();
        let principal = auth
            .authenticate(&credentials("root", "secret"))
            .await
            .unwrap();
        assert_eq!(principal.id, "user_1");
        assert_eq!(principal.name, "root");
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let auth = make_service();
        assert!(auth
            .authenticate(&credentials("root", "guess"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn unknown_user_is_rejected() {
        let auth = make_service();
        assert!(auth
            .authenticate(&credentials("ghost", "secret"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn failed_logins_are_delayed() {
        let auth = AuthService::new(Vec::new()).with_failure_delay(Duration::from_millis(50));
        let start = std::time::Instant::now();
        let _ = auth.authenticate(&credentials("ghost", "x")).await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
