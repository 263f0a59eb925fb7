//! Actor context extraction
//!
//! Identity and session management live in the marketplace core, which fronts
//! this service and forwards the authenticated caller as `X-Actor-Id` and
//! `X-Actor-Role` headers. The extractors here turn that contract into typed
//! actors; role-scoped wrappers gate the clinic and admin surfaces.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Actor, ActorRole};

const ACTOR_ID_HEADER: &str = "x-actor-id";
const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Error response for actor-context failures
#[derive(Debug, Serialize)]
struct ActorError {
    error: ActorErrorDetails,
}

#[derive(Debug, Serialize)]
struct ActorErrorDetails {
    code: String,
    message: String,
}

impl ActorError {
    fn new(status: StatusCode, code: &str, message: &str) -> Response {
        let body = Self {
            error: ActorErrorDetails {
                code: code.to_string(),
                message: message.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }

    fn unauthorized(code: &str, message: &str) -> Response {
        Self::new(StatusCode::UNAUTHORIZED, code, message)
    }

    fn forbidden(message: &str) -> Response {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id_header = parts
            .headers
            .get(ACTOR_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| {
                ActorError::unauthorized("MISSING_ACTOR", "X-Actor-Id header required")
            })?;

        let id = Uuid::parse_str(id_header).map_err(|_| {
            ActorError::unauthorized("INVALID_ACTOR", "X-Actor-Id must be a UUID")
        })?;

        let role_header = parts
            .headers
            .get(ACTOR_ROLE_HEADER)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| {
                ActorError::unauthorized("MISSING_ACTOR", "X-Actor-Role header required")
            })?;

        // The gateway role is internal only; it never arrives over HTTP.
        let role = match role_header.to_lowercase().as_str() {
            "patient" => ActorRole::Patient,
            "clinic" => ActorRole::Clinic,
            "admin" => ActorRole::Admin,
            _ => {
                return Err(ActorError::unauthorized(
                    "INVALID_ROLE",
                    "X-Actor-Role must be patient, clinic, or admin",
                ))
            }
        };

        Ok(Actor { id, role })
    }
}

/// Extractor requiring the admin role
pub struct AdminActor(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for AdminActor
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let actor = Actor::from_request_parts(parts, state).await?;

        if actor.role != ActorRole::Admin {
            return Err(ActorError::forbidden("Admin access required"));
        }

        Ok(AdminActor(actor))
    }
}

/// Extractor requiring the clinic role
pub struct ClinicActor(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for ClinicActor
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let actor = Actor::from_request_parts(parts, state).await?;

        if actor.role != ActorRole::Clinic {
            return Err(ActorError::forbidden("Clinic access required"));
        }

        Ok(ClinicActor(actor))
    }
}

/// Extractor requiring the patient role
pub struct PatientActor(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for PatientActor
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let actor = Actor::from_request_parts(parts, state).await?;

        if actor.role != ActorRole::Patient {
            return Err(ActorError::forbidden("Patient access required"));
        }

        Ok(PatientActor(actor))
    }
}
