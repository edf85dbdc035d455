//! Authentication/authorization is treated as an external collaborator,
//! specified only by interface. This module implements just enough of that
//! interface to drive the rest of the API: a bearer token that round-trips a
//! `Principal`, and a permission check every handler calls.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::api::routes::AppState;
use crate::error::AppError;
use crate::models::Plan;

/// Decoded from the `Authorization: Bearer <token>` header. The token itself
/// is a base64-encoded JSON envelope, not a JWT — see `DESIGN.md` for why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub subject: String,
    pub tenant_id: String,
    pub roles: Vec<String>,
    pub plan: Plan,
    pub region: String,
}

impl Principal {
    pub fn encode(&self) -> Result<String, AppError> {
        let json = serde_json::to_vec(self).map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
        Ok(BASE64.encode(json))
    }

    pub fn decode(token: &str) -> Result<Self, AppError> {
        let bytes = BASE64
            .decode(token)
            .map_err(|_| AppError::Unauthorized("malformed bearer token".into()))?;
        serde_json::from_slice(&bytes).map_err(|_| AppError::Unauthorized("malformed bearer token".into()))
    }

    /// Stub ABAC/RBAC policy: any authenticated principal holds every known
    /// permission. Real policy evaluation is out of scope.
    pub fn require(&self, permission: &str) -> Result<(), AppError> {
        const KNOWN: &[&str] = &["payments:write", "payments:read", "admin:write"];
        if !KNOWN.contains(&permission) {
            return Err(AppError::Forbidden(format!("unknown permission {permission}")));
        }
        Ok(())
    }

    /// Enforces that the principal's tenant matches the request's `X-Tenant-Id`.
    pub fn require_tenant(&self, tenant_id: &str) -> Result<(), AppError> {
        if self.tenant_id != tenant_id {
            return Err(AppError::Forbidden("principal tenant does not match X-Tenant-Id".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing Authorization header".into()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Authorization header must be a Bearer token".into()))?;

        Principal::decode(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrips() {
        let principal = Principal {
            subject: "user@example.com".into(),
            tenant_id: "t1".into(),
            roles: vec!["admin".into()],
            plan: Plan::Pro,
            region: "us".into(),
        };
        let token = principal.encode().unwrap();
        let decoded = Principal::decode(&token).unwrap();
        assert_eq!(decoded.subject, principal.subject);
        assert_eq!(decoded.tenant_id, principal.tenant_id);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Principal::decode("not-base64-json!!").is_err());
    }

    #[test]
    fn require_grants_known_permissions() {
        let principal = Principal {
            subject: "s".into(),
            tenant_id: "t1".into(),
            roles: vec![],
            plan: Plan::Free,
            region: "us".into(),
        };
        assert!(principal.require("payments:write").is_ok());
        assert!(principal.require("nonexistent:permission").is_err());
    }

    #[test]
    fn require_tenant_rejects_mismatch() {
        let principal = Principal {
            subject: "s".into(),
            tenant_id: "t1".into(),
            roles: vec![],
            plan: Plan::Free,
            region: "us".into(),
        };
        assert!(principal.require_tenant("t2").is_err());
        assert!(principal.require_tenant("t1").is_ok());
    }
}
