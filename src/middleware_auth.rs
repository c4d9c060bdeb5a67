//! Authentication middleware
//!
//! HTTP middleware that resolves bearer tokens to an authenticated actor and
//! injects the result into request extensions. Credentials are optional at
//! this layer: anonymous view capture, the payment webhook, and the health
//! endpoint all run without a token, and handlers that need an actor call
//! `Actor::require` themselves. A present-but-invalid token is rejected
//! outright.

use crate::{auth::AuthUser, error::AppResult};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::warn;

/// The actor attached to a request, possibly anonymous
#[derive(Debug, Clone)]
pub struct Actor(pub Option<AuthUser>);

impl Actor {
    /// Returns the authenticated actor or an `Unauthorized` failure
    pub fn require(&self) -> AppResult<&AuthUser> {
        self.0
            .as_ref()
            .ok_or_else(|| crate::auth_error!("Authentication required"))
    }

    /// The actor's user id, when authenticated
    pub fn user_id(&self) -> Option<uuid::Uuid> {
        self.0.as_ref().map(|user| user.id)
    }
}

/// Resolves credentials and injects the actor into request extensions
pub async fn auth_middleware(
    State(state): State<crate::AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let actor = match bearer_token(request.headers()) {
        Some(token) => match state.auth.authenticate(&token, &state.database).await {
            Ok(user) => Actor(Some(user)),
            Err(e) => {
                warn!("Token authentication failed: {}", e);
                return Err(StatusCode::UNAUTHORIZED);
            }
        },
        None => Actor(None),
    };

    request.extensions_mut().insert(actor);
    Ok(next.run(request).await)
}

/// Extracts a bearer token from the Authorization header, if any
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth_header = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    auth_header
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Tests bearer token extraction from headers
    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi".to_string()));

        headers.insert("authorization", "Basic dXNlcjpwYXNz".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    /// Tests anonymous vs. authenticated actor requirements
    #[test]
    fn test_actor_require() {
        let anonymous = Actor(None);
        assert!(anonymous.require().is_err());
        assert_eq!(anonymous.user_id(), None);

        let id = Uuid::new_v4();
        let actor = Actor(Some(AuthUser {
            id,
            email: "actor@test.local".to_string(),
            is_admin: false,
            is_active: true,
        }));
        assert!(actor.require().is_ok());
        assert_eq!(actor.user_id(), Some(id));
    }
}
