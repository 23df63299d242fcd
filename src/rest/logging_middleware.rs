use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::info;

pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start_time = Instant::now();

    let response = next.run(request).await;

    info!(
        method = %method,
        path = %uri.path(),
        status = response.status().as_u16(),
        duration_ms = %start_time.elapsed().as_millis(),
        "Handled request"
    );

    response
}
