use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::models::principal::{Principal, Role};
use crate::types::PrincipalId;

/// Claims issued by the identity provider. Tokens are HS256-signed with the
/// shared `JWT_SECRET`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(principal_id: PrincipalId, role: Role, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: principal_id.to_string(),
            role,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        }
    }

    pub fn principal(&self) -> anyhow::Result<Principal> {
        let id: PrincipalId = self
            .sub
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid subject in token: {}", e))?;
        Ok(Principal {
            id,
            role: self.role,
        })
    }
}

pub fn create_access_token(
    principal_id: PrincipalId,
    role: Role,
    secret: &str,
    ttl: Duration,
) -> anyhow::Result<String> {
    let claims = Claims::new(principal_id, role, ttl);
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;

    Ok(token)
}

pub fn verify_access_token(token: &str, secret: &str) -> anyhow::Result<Claims> {
    let validation = Validation::default();
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_verify_round_trips_principal() {
        let id = PrincipalId::new();
        let token = create_access_token(id, Role::Organizer, "secret", Duration::hours(1))
            .expect("create token");
        let claims = verify_access_token(&token, "secret").expect("verify token");
        let principal = claims.principal().expect("principal");
        assert_eq!(principal.id, id);
        assert_eq!(principal.role, Role::Organizer);
    }

    #[test]
    fn verify_rejects_wrong_secret_and_expired_tokens() {
        let id = PrincipalId::new();
        let token = create_access_token(id, Role::Student, "secret", Duration::hours(1)).unwrap();
        assert!(verify_access_token(&token, "other").is_err());

        let expired =
            create_access_token(id, Role::Student, "secret", Duration::hours(-2)).unwrap();
        assert!(verify_access_token(&expired, "secret").is_err());
    }

    #[test]
    fn unknown_role_is_rejected() {
        let header = Header::default();
        let claims = serde_json::json!({
            "sub": PrincipalId::new().to_string(),
            "role": "janitor",
            "exp": (Utc::now() + Duration::hours(1)).timestamp(),
            "iat": Utc::now().timestamp(),
        });
        let token = encode(&header, &claims, &EncodingKey::from_secret(b"secret")).unwrap();
        assert!(verify_access_token(&token, "secret").is_err());
    }
}
