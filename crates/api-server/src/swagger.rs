//! OpenAPI specification and Swagger UI configuration.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Rotation Express API",
        version = "0.1.0",
        description = "Content rotation service.\n\nSelects, per display context, which candidate item to show next using a multi-armed-bandit policy with forced exploration, and records exposure/engagement feedback.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Rotation", description = "Candidate selection, event recording and rotation administration"),
        (name = "Operations", description = "Health, readiness, and liveness probes"),
    ),
    paths(
        // Rotation
        crate::rest::handle_selection,
        crate::rest::handle_engagement,
        crate::rest::handle_exposure,
        crate::rest::handle_add_candidate,
        crate::rest::handle_remove_candidate,
        // Operations
        crate::rest::health_check,
        crate::rest::readiness,
        crate::rest::liveness,
    ),
    components(schemas(
        crate::rest::SelectionResponse,
        crate::rest::StatusResponse,
        crate::rest::ErrorResponse,
        crate::rest::HealthResponse,
        rotation_core::types::EventKind,
    ))
)]
pub struct ApiDoc;
