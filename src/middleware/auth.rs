//! Bearer token authentication for dashboard and lifecycle handlers.
//!
//! Tokens are issued by the storefront's login service; this crate only
//! validates them.

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::UserRole;
use crate::AppState;

/// HS256 claims shared with the issuing service.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub user_id: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

/// Validate a JWT and return its claims.
pub fn validate_token(token: &str, jwt_secret: &str) -> Result<Claims, AppError> {
    let decoding_key = DecodingKey::from_secret(jwt_secret.as_bytes());
    jsonwebtoken::decode::<Claims>(token, &decoding_key, &Validation::default())
        .map(|data| data.claims)
        .map_err(|_| AppError::Unauthorized)
}

/// Sign a token for `user_id`, valid for `ttl_secs`. Used by the seed binary
/// and tests.
pub fn issue_token(
    user_id: Uuid,
    name: &str,
    role: UserRole,
    jwt_secret: &str,
    ttl_secs: i64,
) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: name.to_string(),
        user_id: user_id.to_string(),
        role: role_name(role).to_string(),
        exp: (now + Duration::seconds(ttl_secs)).timestamp(),
        iat: now.timestamp(),
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token signing failed: {e}")))
}

fn role_name(role: UserRole) -> &'static str {
    match role {
        UserRole::Admin => "admin",
        UserRole::User => "user",
    }
}

fn parse_role(raw: &str) -> Option<UserRole> {
    match raw.to_ascii_lowercase().as_str() {
        "admin" => Some(UserRole::Admin),
        "user" => Some(UserRole::User),
        _ => None,
    }
}

/// Authenticated caller.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub name: String,
    pub role: UserRole,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Unauthorized)?;

        let claims = validate_token(bearer.token(), &state.config.jwt_secret)?;
        let id: Uuid = claims.user_id.parse().map_err(|_| AppError::Unauthorized)?;
        let role = parse_role(&claims.role).ok_or(AppError::Unauthorized)?;

        Ok(CurrentUser {
            id,
            name: claims.sub,
            role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-for-jwt";

    #[test]
    fn issued_token_validates() {
        let id = Uuid::new_v4();
        let token = issue_token(id, "awa", UserRole::Admin, SECRET, 900).unwrap();
        let claims = validate_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, "awa");
        assert_eq!(claims.user_id, id.to_string());
        assert_eq!(parse_role(&claims.role), Some(UserRole::Admin));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token(Uuid::new_v4(), "awa", UserRole::User, SECRET, 900).unwrap();
        assert!(validate_token(&token, "another-secret").is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(validate_token("garbage.token.here", SECRET).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        // Past the default 60s leeway.
        let token = issue_token(Uuid::new_v4(), "awa", UserRole::Admin, SECRET, -3600).unwrap();
        assert!(validate_token(&token, SECRET).is_err());
    }

    #[test]
    fn unknown_roles_do_not_parse() {
        assert_eq!(parse_role("ADMIN"), Some(UserRole::Admin));
        assert_eq!(parse_role("superuser"), None);
    }
}
