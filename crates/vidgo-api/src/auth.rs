//! Request identity extraction.
//!
//! Authentication itself happens upstream: the gateway verifies the session
//! and injects `x-user-id` and `x-user-plan` headers. Absent headers mean an
//! anonymous request, which routes to demo mode.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;

use vidgo_models::PlanTier;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_PLAN_HEADER: &str = "x-user-plan";

/// Identity of the caller, possibly anonymous.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Option<String>,
    pub plan: PlanTier,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            user_id: None,
            plan: PlanTier::Free,
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        // Unknown or missing plans degrade to free rather than erroring
        let plan = parts
            .headers
            .get(USER_PLAN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(PlanTier::parse_or_free)
            .unwrap_or(PlanTier::Free);

        Ok(Self { user_id, plan })
    }
}

/// Identity that must belong to a signed-in user.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub plan: PlanTier,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let identity = Identity::from_request_parts(parts, state)
            .await
            .unwrap_or_else(|_| Identity::anonymous());
        match identity.user_id {
            Some(user_id) => Ok(Self {
                user_id,
                plan: identity.plan,
            }),
            None => Err(ApiError::unauthorized("Missing user identity")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn identity_for(headers: &[(&str, &str)]) -> Identity {
        let mut builder = Request::builder().uri("/");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Identity::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn test_missing_headers_mean_anonymous() {
        let identity = identity_for(&[]).await;
        assert!(identity.user_id.is_none());
        assert_eq!(identity.plan, PlanTier::Free);
    }

    #[tokio::test]
    async fn test_headers_parsed() {
        let identity = identity_for(&[("x-user-id", "u1"), ("x-user-plan", "creator")]).await;
        assert_eq!(identity.user_id.as_deref(), Some("u1"));
        assert_eq!(identity.plan, PlanTier::Creator);
    }

    #[tokio::test]
    async fn test_unknown_plan_degrades_to_free() {
        let identity = identity_for(&[("x-user-id", "u1"), ("x-user-plan", "enterprise")]).await;
        assert_eq!(identity.plan, PlanTier::Free);
    }

    #[tokio::test]
    async fn test_auth_user_rejects_anonymous() {
        let (mut parts, _) = Request::builder()
            .uri("/")
            .body(())
            .unwrap()
            .into_parts();
        assert!(AuthUser::from_request_parts(&mut parts, &()).await.is_err());
    }
}
