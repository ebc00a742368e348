//! Resolved-identity extraction.
//!
//! Authentication itself happens upstream: the gateway verifies the session
//! and forwards the principal as `x-user-id` and `x-user-role` headers. This
//! middleware only turns those headers into an [`Identity`] request extension
//! and rejects requests that arrive without one. Services never see
//! credentials, only the resolved identity.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorForbidden,
    Error as ActixError, FromRequest, HttpMessage, HttpRequest, HttpResponse,
};
use futures_util::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(()),
        }
    }
}

/// The authenticated principal as resolved by the upstream auth collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Role gate for admin-only handlers. Maps to 403.
    pub fn require_admin(&self) -> Result<(), ActixError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ErrorForbidden(json!({
                "error": "Forbidden",
                "message": "Administrator role required"
            })))
        }
    }
}

impl FromRequest for Identity {
    type Error = ActixError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let identity = req.extensions().get::<Identity>().cloned();
        ready(identity.ok_or_else(|| {
            actix_web::error::ErrorUnauthorized(json!({
                "error": "Not authenticated",
                "message": "No identity attached to request"
            }))
        }))
    }
}

#[derive(Clone)]
enum IdentityMode {
    Enabled,
    Disabled(Identity),
}

pub struct IdentityMiddlewareFactory {
    mode: IdentityMode,
}

impl IdentityMiddlewareFactory {
    /// Require a gateway-resolved identity on every non-public request.
    pub fn new() -> Self {
        Self {
            mode: IdentityMode::Enabled,
        }
    }

    /// Inject a fixed admin identity instead of requiring headers. Local
    /// development only.
    pub fn disabled() -> Self {
        tracing::warn!("Identity middleware disabled; injecting default admin identity.");
        Self {
            mode: IdentityMode::Disabled(Identity {
                user_id: Uuid::nil(),
                role: Role::Admin,
            }),
        }
    }
}

impl Default for IdentityMiddlewareFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for IdentityMiddlewareFactory {
    fn clone(&self) -> Self {
        Self {
            mode: self.mode.clone(),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for IdentityMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = ActixError;
    type Transform = IdentityMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(IdentityMiddleware {
            service: Rc::new(service),
            mode: self.mode.clone(),
        }))
    }
}

pub struct IdentityMiddleware<S> {
    service: Rc<S>,
    mode: IdentityMode,
}

fn is_public_endpoint(path: &str) -> bool {
    path == "/health"
}

fn resolve_identity(req: &ServiceRequest) -> Option<Identity> {
    let user_id = req
        .headers()
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())?;
    let role = req
        .headers()
        .get("x-user-role")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Role::from_str(v).ok())?;
    Some(Identity { user_id, role })
}

impl<S, B> Service<ServiceRequest> for IdentityMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = ActixError;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let mode = self.mode.clone();

        Box::pin(async move {
            if is_public_endpoint(req.path()) {
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            }

            match mode {
                IdentityMode::Enabled => match resolve_identity(&req) {
                    Some(identity) => {
                        req.extensions_mut().insert(identity);
                        let res = service.call(req).await?;
                        Ok(res.map_into_left_body())
                    }
                    None => {
                        tracing::warn!(path = %req.path(), "Request without resolved identity");
                        Ok(req
                            .into_response(HttpResponse::Unauthorized().json(json!({
                                "error": "Not authenticated",
                                "message": "Missing or invalid identity headers"
                            })))
                            .map_into_right_body())
                    }
                },
                IdentityMode::Disabled(default_identity) => {
                    req.extensions_mut().insert(default_identity.clone());
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!(Role::from_str("admin"), Ok(Role::Admin));
        assert_eq!(Role::from_str("user"), Ok(Role::User));
        assert!(Role::from_str("superuser").is_err());
    }

    #[test]
    fn test_admin_gate() {
        let admin = Identity {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
        };
        assert!(admin.require_admin().is_ok());

        let user = Identity {
            user_id: Uuid::new_v4(),
            role: Role::User,
        };
        assert!(user.require_admin().is_err());
    }
}
