//! Bearer-token gate in front of every file RPC.
//!
//! The server side is a tonic interceptor: it validates the
//! `authorization: Bearer <jwt>` header and stashes the caller's
//! [`UserId`] in the request extensions. Handlers then call [`caller`]
//! and fail closed if no identity is present.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tonic::metadata::MetadataValue;
use tonic::service::Interceptor;
use tonic::{Request, Status};
use vault_core::{Result, UserId, VaultError};

const BEARER: &str = "Bearer ";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub exp: u64,
}

/// Verifies HS256 tokens.
#[derive(Clone)]
pub struct JwtAuthenticator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<UserId> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| UserId(data.claims.sub))
            .map_err(|e| VaultError::Unauthenticated(format!("invalid token: {e}")))
    }

    fn authenticate<T>(&self, req: &Request<T>) -> Result<UserId> {
        let header = req
            .metadata()
            .get("authorization")
            .ok_or_else(|| VaultError::Unauthenticated("authorization header not provided".into()))?
            .to_str()
            .map_err(|_| VaultError::Unauthenticated("authorization header is not ASCII".into()))?;
        let token = header
            .strip_prefix(BEARER)
            .ok_or_else(|| VaultError::Unauthenticated("invalid authorization format".into()))?;
        self.verify(token.trim())
    }
}

impl Interceptor for JwtAuthenticator {
    fn call(&mut self, mut req: Request<()>) -> std::result::Result<Request<()>, Status> {
        match self.authenticate(&req) {
            Ok(user) => {
                req.extensions_mut().insert(user);
                Ok(req)
            }
            Err(e) => {
                tracing::warn!(error = %e, "rejected unauthenticated call");
                Err(Status::unauthenticated(e.to_string()))
            }
        }
    }
}

/// Identity injected by [`JwtAuthenticator`]; absent means reject.
pub fn caller<T>(req: &Request<T>) -> std::result::Result<UserId, Status> {
    req.extensions()
        .get::<UserId>()
        .copied()
        .ok_or_else(|| Status::unauthenticated("user not authenticated"))
}

/// Mints HS256 tokens for a user id.
#[derive(Clone)]
pub struct TokenIssuer {
    key: EncodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            key: EncodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn issue(&self, user: UserId) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let claims = Claims {
            sub: user.0,
            exp: (now + self.ttl).as_secs(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.key)
            .map_err(|e| VaultError::Config(format!("token encoding failed: {e}")))
    }
}

/// Client-side interceptor attaching a bearer token to every call.
#[derive(Clone)]
pub struct BearerToken {
    value: MetadataValue<tonic::metadata::Ascii>,
}

impl BearerToken {
    pub fn new(token: &str) -> Result<Self> {
        let value = format!("{BEARER}{token}")
            .parse()
            .map_err(|_| VaultError::Config("token is not a valid header value".into()))?;
        Ok(Self { value })
    }
}

impl Interceptor for BearerToken {
    fn call(&mut self, mut req: Request<()>) -> std::result::Result<Request<()>, Status> {
        req.metadata_mut().insert("authorization", self.value.clone());
        Ok(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret";

    fn request_with(header: Option<&str>) -> Request<()> {
        let mut req = Request::new(());
        if let Some(h) = header {
            req.metadata_mut().insert("authorization", h.parse().unwrap());
        }
        req
    }

    #[test]
    fn valid_token_injects_identity() {
        let token = TokenIssuer::new(SECRET, Duration::from_secs(60))
            .issue(UserId(42))
            .unwrap();
        let mut gate = JwtAuthenticator::new(SECRET);
        let req = gate
            .call(request_with(Some(&format!("Bearer {token}"))))
            .unwrap();
        assert_eq!(caller(&req).unwrap(), UserId(42));
    }

    #[test]
    fn missing_malformed_or_forged_tokens_are_rejected() {
        let mut gate = JwtAuthenticator::new(SECRET);
        let forged = TokenIssuer::new(b"other", Duration::from_secs(60))
            .issue(UserId(1))
            .unwrap();
        for header in [
            None,
            Some("Basic abc".to_string()),
            Some("Bearer not-a-jwt".to_string()),
            Some(format!("Bearer {forged}")),
        ] {
            let err = gate.call(request_with(header.as_deref())).unwrap_err();
            assert_eq!(err.code(), tonic::Code::Unauthenticated);
        }
    }

    #[test]
    fn expired_token_is_rejected() {
        let key = EncodingKey::from_secret(SECRET);
        let claims = Claims { sub: 1, exp: 1_000 };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &key).unwrap();
        assert!(JwtAuthenticator::new(SECRET).verify(&token).is_err());
    }

    #[test]
    fn handlers_fail_closed_without_identity() {
        let err = caller(&Request::new(())).unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn bearer_interceptor_sets_header() {
        let mut bearer = BearerToken::new("abc.def.ghi").unwrap();
        let req = bearer.call(Request::new(())).unwrap();
        assert_eq!(
            req.metadata().get("authorization").unwrap().to_str().unwrap(),
            "Bearer abc.def.ghi"
        );
    }
}
