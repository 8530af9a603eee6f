use axum::response::Response;
use serde::Serialize;

use crate::response::success;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "muster-api",
    };

    success(payload, "Health check successful")
}
