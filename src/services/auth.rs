//! Bearer-token authentication by delegation to the user service.
//!
//! The gateway never inspects token internals. A present credential is
//! validated by calling the user service's profile endpoint with the same
//! bearer; any outcome other than a 200 profile with a usable id maps to the
//! one `UNAUTHORIZED` envelope, so clients cannot distinguish a malformed
//! token from a rejected one.

use crate::models::auth::AuthenticatedUser;
use crate::models::error::GatewayError;
use crate::models::route::AuthPolicy;
use crate::models::service::ServiceDescriptor;
use crate::utils::path::compose_upstream_url;
use log::debug;
use reqwest::Client;
use std::sync::Arc;

const PROFILE_PATH: &str = "/api/profile";

pub struct Authenticator {
    client: Client,
    user_service: Arc<ServiceDescriptor>,
}

impl Authenticator {
    pub fn new(client: Client, user_service: Arc<ServiceDescriptor>) -> Self {
        Self {
            client,
            user_service,
        }
    }

    /// Applies the route's auth policy to the inbound Authorization header.
    ///
    /// A header that is present but invalid fails even on optional-auth
    /// routes, so a bad token can never silently downgrade to anonymous
    /// access.
    pub async fn authenticate(
        &self,
        header: Option<&str>,
        policy: AuthPolicy,
    ) -> Result<Option<AuthenticatedUser>, GatewayError> {
        match (policy, header) {
            (AuthPolicy::None, _) => Ok(None),
            (AuthPolicy::Optional, None) => Ok(None),
            (AuthPolicy::Required, None) => Err(GatewayError::Unauthorized),
            (_, Some(header)) => self.validate_bearer(header).await.map(Some),
        }
    }

    async fn validate_bearer(&self, header: &str) -> Result<AuthenticatedUser, GatewayError> {
        let credential = bearer_credential(header).ok_or(GatewayError::Unauthorized)?;
        if credential.is_empty() {
            return Err(GatewayError::Unauthorized);
        }

        let url = compose_upstream_url(&self.user_service.base_url, PROFILE_PATH);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, header)
            .timeout(self.user_service.timeout())
            .send()
            .await
            .map_err(|e| {
                debug!("token validation transport failure: {}", e);
                GatewayError::Unauthorized
            })?;

        if response.status() != reqwest::StatusCode::OK {
            debug!("token validation rejected with status {}", response.status());
            return Err(GatewayError::Unauthorized);
        }

        let profile: serde_json::Value = response.json().await.map_err(|e| {
            debug!("token validation returned unreadable profile: {}", e);
            GatewayError::Unauthorized
        })?;

        AuthenticatedUser::from_profile(&profile).ok_or(GatewayError::Unauthorized)
    }
}

/// Extracts the credential from a `Bearer` authorization header value.
pub fn bearer_credential(header: &str) -> Option<&str> {
    header.strip_prefix("Bearer ").map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator() -> Authenticator {
        let user_service = Arc::new(ServiceDescriptor {
            name: "user-service".to_string(),
            // Nothing listens here; validation calls fail as transport
            // errors, which must map to Unauthorized.
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_ms: 200,
            max_retries: 0,
            health_path: "/health".to_string(),
            breaker: None,
        });
        Authenticator::new(Client::new(), user_service)
    }

    #[test]
    fn bearer_credential_parsing() {
        assert_eq!(bearer_credential("Bearer abc123"), Some("abc123"));
        assert_eq!(bearer_credential("Bearer "), Some(""));
        assert_eq!(bearer_credential("Basic xyz"), None);
        assert_eq!(bearer_credential("bearer abc"), None);
    }

    #[tokio::test]
    async fn public_routes_skip_validation() {
        let auth = authenticator();
        let user = auth
            .authenticate(Some("Bearer whatever"), AuthPolicy::None)
            .await
            .unwrap();
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn optional_without_header_proceeds_anonymously() {
        let auth = authenticator();
        let user = auth.authenticate(None, AuthPolicy::Optional).await.unwrap();
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn required_without_header_is_unauthorized() {
        let auth = authenticator();
        let err = auth.authenticate(None, AuthPolicy::Required).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unauthorized));
    }

    #[tokio::test]
    async fn malformed_header_fails_even_on_optional_routes() {
        let auth = authenticator();

        let basic = auth
            .authenticate(Some("Basic xyz"), AuthPolicy::Optional)
            .await
            .unwrap_err();
        assert!(matches!(basic, GatewayError::Unauthorized));

        let empty = auth
            .authenticate(Some("Bearer "), AuthPolicy::Optional)
            .await
            .unwrap_err();
        assert!(matches!(empty, GatewayError::Unauthorized));
    }

    #[tokio::test]
    async fn unreachable_user_service_is_unauthorized() {
        let auth = authenticator();
        let err = auth
            .authenticate(Some("Bearer token"), AuthPolicy::Required)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unauthorized));
    }
}
