//! Token verification seam.
//!
//! The HTTP middleware depends on the `JwtValidator` trait so tests can
//! substitute a validator without minting real tokens.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};

use crate::claims::{OrderClaims, TokenError};

/// Verifies a bearer token and returns its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str) -> Result<OrderClaims, TokenError>;
}

/// HMAC-SHA256 validator over a shared secret.
pub struct Hs256JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str) -> Result<OrderClaims, TokenError> {
        let data = decode::<OrderClaims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            },
        )?;

        // Decoding succeeds without the subject claim; the relay must not.
        data.claims.student()?;

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{EncodingKey, Header, encode};

    const SECRET: &str = "test-secret";

    fn mint(student_id: Option<&str>, ttl: Duration) -> String {
        let now = Utc::now();
        let claims = OrderClaims {
            student_id: student_id.map(String::from),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_yields_student() {
        let validator = Hs256JwtValidator::new(SECRET);
        let claims = validator
            .validate(&mint(Some("s-123"), Duration::minutes(10)))
            .unwrap();
        assert_eq!(claims.student().unwrap().as_str(), "s-123");
    }

    #[test]
    fn expired_token_is_rejected() {
        let validator = Hs256JwtValidator::new(SECRET);
        let err = validator
            .validate(&mint(Some("s-123"), Duration::minutes(-10)))
            .unwrap_err();
        assert_eq!(err, TokenError::Expired);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let validator = Hs256JwtValidator::new("other-secret");
        let err = validator
            .validate(&mint(Some("s-123"), Duration::minutes(10)))
            .unwrap_err();
        assert!(matches!(err, TokenError::Invalid(_)));
    }

    #[test]
    fn missing_student_claim_is_rejected() {
        let validator = Hs256JwtValidator::new(SECRET);
        let err = validator
            .validate(&mint(None, Duration::minutes(10)))
            .unwrap_err();
        assert_eq!(err, TokenError::MissingClaim("student_id"));
    }

    #[test]
    fn garbage_token_is_invalid() {
        let validator = Hs256JwtValidator::new(SECRET);
        assert!(matches!(
            validator.validate("not.a.jwt").unwrap_err(),
            TokenError::Invalid(_)
        ));
    }
}
