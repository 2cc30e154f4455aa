//! Request identity and the admin gate.
//!
//! Sessions are handled by the identity provider in front of this service,
//! which forwards the signed-in user as `x-user-*` headers.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;

use crate::AppState;
use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_ROLE_HEADER: &str = "x-user-role";

const ADMIN_ROLE: &str = "ADMIN";

/// The signed-in user, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

impl Identity {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };
        Self {
            user_id: header(USER_ID_HEADER),
            email: header(USER_EMAIL_HEADER),
            role: header(USER_ROLE_HEADER),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none() && self.email.is_none() && self.role.is_none()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Identity::from_headers(&parts.headers))
    }
}

/// Who may use the back office.
#[derive(Debug, Clone, Default)]
pub struct AdminPolicy {
    emails: Vec<String>,
}

impl AdminPolicy {
    pub fn new(emails: impl IntoIterator<Item = String>) -> Self {
        Self {
            emails: emails.into_iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    /// Admin role, or an email on the allow-list.
    pub fn is_admin(&self, identity: &Identity) -> bool {
        let by_role = identity
            .role
            .as_deref()
            .is_some_and(|role| role.eq_ignore_ascii_case(ADMIN_ROLE));
        let by_email = identity
            .email
            .as_deref()
            .is_some_and(|email| self.emails.iter().any(|a| a.eq_ignore_ascii_case(email)));
        by_role || by_email
    }
}

/// Middleware gating every back-office route.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = Identity::from_headers(request.headers());
    if identity.is_anonymous() {
        return Err(ApiError::Unauthorized);
    }
    if !state.admins.is_admin(&identity) {
        metrics::counter!("admin_access_denied_total").increment(1);
        tracing::warn!(user_id = ?identity.user_id, "admin access denied");
        return Err(ApiError::Forbidden);
    }
    Ok(next.run(request).await)
}
