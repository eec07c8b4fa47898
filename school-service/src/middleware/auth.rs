use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::{
    services::{AccessTokenClaims, Role},
    AppState,
};

pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// Token from `Authorization: Bearer …`, falling back to `x-auth-token`.
fn extract_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .or_else(|| {
            headers
                .get(AUTH_TOKEN_HEADER)
                .and_then(|value| value.to_str().ok())
        })
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Middleware to require authentication
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(req.headers()).ok_or_else(|| {
        AppError::Unauthorized(anyhow::anyhow!("No token, authorization denied"))
    })?;

    let claims = state.jwt.validate_token(token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected access token");
        AppError::Unauthorized(anyhow::anyhow!("Token is not valid"))
    })?;

    // Store claims in request extensions so handlers can access them
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Extractor to easily get claims in handlers
pub struct AuthUser(pub AccessTokenClaims);

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.0.sub
    }

    pub fn require_any(&self, roles: &[Role]) -> Result<(), AppError> {
        if roles.contains(&self.0.role) {
            Ok(())
        } else {
            tracing::warn!(user_id = %self.0.sub, role = %self.0.role, "Role not permitted");
            Err(AppError::forbidden("Access denied"))
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        self.require_any(&[Role::Admin])
    }

    pub fn require_staff(&self) -> Result<(), AppError> {
        self.require_any(&[Role::Admin, Role::Teacher])
    }

    /// Staff may read any student's records; a student only their own.
    pub fn require_student_access(&self, student_id: &str) -> Result<(), AppError> {
        match self.0.role {
            Role::Admin | Role::Teacher => Ok(()),
            Role::Student if self.0.sub == student_id => Ok(()),
            Role::Student => Err(AppError::forbidden("Access denied")),
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<AccessTokenClaims>()
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Authentication required")))?;

        Ok(AuthUser(claims.clone()))
    }
}

/// An [`AuthUser`] already checked for the admin role. Rejects before any
/// body extractor runs, so non-admins see 403 whatever they sent.
pub struct AdminUser(pub AuthUser);

impl AdminUser {
    pub fn id(&self) -> &str {
        self.0.id()
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        user.require_admin()?;
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header_wins_over_x_auth_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(AUTH_TOKEN_HEADER, HeaderValue::from_static("xyz"));
        assert_eq!(extract_token(&headers), Some("abc"));
    }

    #[test]
    fn x_auth_token_is_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTH_TOKEN_HEADER, HeaderValue::from_static("xyz"));
        assert_eq!(extract_token(&headers), Some("xyz"));
    }

    #[test]
    fn missing_or_malformed_headers_yield_nothing() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_token(&headers), None);
    }

    fn parts_with(claims: Option<AccessTokenClaims>) -> Parts {
        let (mut parts, _) = axum::http::Request::new(()).into_parts();
        if let Some(claims) = claims {
            parts.extensions.insert(claims);
        }
        parts
    }

    #[tokio::test]
    async fn admin_extractor_rejects_other_roles() {
        let mut parts = parts_with(Some(user(Role::Teacher, "t1").0));
        assert!(matches!(
            AdminUser::from_request_parts(&mut parts, &()).await,
            Err(AppError::Forbidden(_))
        ));

        let mut parts = parts_with(None);
        assert!(matches!(
            AdminUser::from_request_parts(&mut parts, &()).await,
            Err(AppError::Unauthorized(_))
        ));

        let mut parts = parts_with(Some(user(Role::Admin, "a1").0));
        let admin = AdminUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(admin.id(), "a1");
    }

    fn user(role: Role, sub: &str) -> AuthUser {
        AuthUser(AccessTokenClaims {
            sub: sub.to_string(),
            role,
            exp: 0,
            iat: 0,
        })
    }

    #[test]
    fn students_only_reach_their_own_records() {
        assert!(user(Role::Student, "s1").require_student_access("s1").is_ok());
        assert!(user(Role::Student, "s1").require_student_access("s2").is_err());
        assert!(user(Role::Teacher, "t1").require_student_access("s2").is_ok());
        assert!(user(Role::Teacher, "t1").require_admin().is_err());
        assert!(user(Role::Student, "s1").require_staff().is_err());
    }
}
