/*!
 * # Authentication and Authorization
 *
 * Identity is owned by an upstream provider; this service only consumes
 * HS256-signed bearer tokens carrying a user id (`sub`) and a role. The
 * middleware in this module validates the token, places an [`AuthUser`] in
 * the request extensions and gates manager-only routes by role.
 */

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::errors::ServiceError;

/// Roles recognised by the warehouse API.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Role {
    Admin,
    Manager,
    Staff,
}

impl Role {
    /// Whether a caller holding `self` may use a route that requires `required`.
    /// Admins pass every check and managers pass staff checks.
    pub fn satisfies(self, required: Role) -> bool {
        match self {
            Role::Admin => true,
            Role::Manager => matches!(required, Role::Manager | Role::Staff),
            Role::Staff => required == Role::Staff,
        }
    }
}

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Authenticated user data extracted from the JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
    pub name: Option<String>,
}

impl AuthUser {
    pub fn has_role(&self, role: Role) -> bool {
        self.role.satisfies(role)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub token_expiration_secs: u64,
}

impl AuthConfig {
    pub fn new(
        jwt_secret: String,
        jwt_audience: String,
        jwt_issuer: String,
        token_expiration_secs: u64,
    ) -> Self {
        Self {
            jwt_secret,
            jwt_audience,
            jwt_issuer,
            token_expiration_secs,
        }
    }
}

impl From<&crate::config::AppConfig> for AuthConfig {
    fn from(cfg: &crate::config::AppConfig) -> Self {
        Self::new(
            cfg.jwt_secret.clone(),
            cfg.jwt_audience.clone(),
            cfg.jwt_issuer.clone(),
            cfg.jwt_expiration,
        )
    }
}

/// Validates bearer tokens. Token issuance is only used by tooling and tests.
#[derive(Clone)]
pub struct AuthService {
    config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Mints a token for `user_id` with the configured issuer, audience and lifetime.
    pub fn issue_token(&self, user_id: Uuid, role: Role) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            role: role.to_string(),
            name: None,
            iat: now,
            exp: now + self.config.token_expiration_secs as i64,
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };
        self.encode_claims(&claims)
    }

    pub fn encode_claims(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    /// Validate a JWT token and extract the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?;

        Ok(data.claims)
    }

    /// Turns validated claims into the request principal.
    pub fn authenticate(&self, token: &str) -> Result<AuthUser, AuthError> {
        let claims = self.validate_token(token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        let role = claims
            .role
            .parse::<Role>()
            .map_err(|_| AuthError::UnknownRole(claims.role.clone()))?;

        Ok(AuthUser {
            user_id,
            role,
            name: claims.name,
        })
    }
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    MissingAuth,

    #[error("Invalid authentication token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Authentication service not available")]
    ServiceUnavailable,
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingAuth
            | AuthError::InvalidToken
            | AuthError::TokenExpired
            | AuthError::UnknownRole(_) => ServiceError::Unauthorized(err.to_string()),
            AuthError::InsufficientPermissions => ServiceError::Forbidden(err.to_string()),
            AuthError::TokenCreation(_) | AuthError::ServiceUnavailable => {
                ServiceError::InternalError(err.to_string())
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ServiceError::from(self).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AuthError::MissingAuth)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Role middleware to check if a user has the required role
pub async fn role_middleware(
    State(required_role): State<Role>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingAuth)?;

    if !user.has_role(required_role) {
        debug!(user_id = %user.user_id, role = %user.role, required = %required_role, "role check failed");
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Authentication middleware that extracts and validates bearer tokens
pub async fn auth_middleware(mut request: Request, next: Next) -> Result<Response, AuthError> {
    let auth_service = request
        .extensions()
        .get::<Arc<AuthService>>()
        .cloned()
        .ok_or(AuthError::ServiceUnavailable)?;

    let token = bearer_token(request.headers()).ok_or(AuthError::MissingAuth)?;
    let user = auth_service.authenticate(token)?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_role(self, role: Role) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.route_layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_role(self, role: Role) -> Self {
        self.route_layer(axum::middleware::from_fn_with_state(role, role_middleware))
            .with_auth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, routing::get, Extension, Router};
    use rstest::rstest;
    use tower::ServiceExt;

    fn service() -> AuthService {
        AuthService::new(AuthConfig::new(
            "unit_test_secret_with_plenty_of_entropy_0123456789".into(),
            "warehouse-api".into(),
            "warehouse-identity".into(),
            600,
        ))
    }

    #[test]
    fn issued_token_authenticates() {
        let auth = service();
        let user_id = Uuid::new_v4();
        let token = auth.issue_token(user_id, Role::Manager).unwrap();

        let user = auth.authenticate(&token).unwrap();
        assert_eq!(user.user_id, user_id);
        assert_eq!(user.role, Role::Manager);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let other = AuthService::new(AuthConfig::new(
            "a_completely_different_secret_value_abcdefghij".into(),
            "warehouse-api".into(),
            "warehouse-identity".into(),
            600,
        ));
        let token = other.issue_token(Uuid::new_v4(), Role::Staff).unwrap();
        assert!(matches!(
            service().authenticate(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let auth = service();
        let now = Utc::now().timestamp();
        let token = auth
            .encode_claims(&Claims {
                sub: Uuid::new_v4().to_string(),
                role: "STAFF".into(),
                name: None,
                iat: now - 7200,
                exp: now - 3600,
                iss: "warehouse-identity".into(),
                aud: "warehouse-api".into(),
            })
            .unwrap();
        assert!(matches!(
            auth.authenticate(&token),
            Err(AuthError::TokenExpired)
        ));
    }

    #[rstest]
    #[case(Role::Admin, Role::Manager, true)]
    #[case(Role::Admin, Role::Staff, true)]
    #[case(Role::Manager, Role::Manager, true)]
    #[case(Role::Manager, Role::Admin, false)]
    #[case(Role::Staff, Role::Manager, false)]
    #[case(Role::Staff, Role::Staff, true)]
    fn role_hierarchy(#[case] held: Role, #[case] required: Role, #[case] allowed: bool) {
        assert_eq!(held.satisfies(required), allowed);
    }

    fn router() -> Router {
        Router::new()
            .route("/manager", get(|| async { "ok" }))
            .with_role(Role::Manager)
            .layer(Extension(Arc::new(service())))
    }

    fn get_with(token: Option<&str>) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::builder().uri("/manager");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn middleware_enforces_token_and_role() {
        let auth = service();
        let staff = auth.issue_token(Uuid::new_v4(), Role::Staff).unwrap();
        let manager = auth.issue_token(Uuid::new_v4(), Role::Manager).unwrap();

        let response = router().oneshot(get_with(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router().oneshot(get_with(Some(&staff))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = router().oneshot(get_with(Some(&manager))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
