use axum::{
    Router, error_handling::HandleErrorLayer, http::StatusCode, response::IntoResponse,
    routing::get,
};
use drip_limit::LeakyBucket;
use std::sync::Arc;
use tower::BoxError;
use tower::ServiceBuilder;
use tower_drip::{AdmissionLayer, DripError};

#[tokio::main]
async fn main() {
    // 1. One shared bucket for the whole server: sustain 300 req/s, absorb
    //    bursts of up to 700.
    let gate = Arc::new(LeakyBucket::new(300.0, 700.0));

    // 2. Build the Router
    let app = Router::new()
        .route("/", get(|| async { "Hello, Drip!" }))
        .layer(
            ServiceBuilder::new()
                // 1. The outermost layer: catches BoxError and returns Response
                .layer(HandleErrorLayer::new(handle_drip_error))
                // 2. The middle layer: introduces BoxError
                .layer(AdmissionLayer::new(gate))
                // 3. The secret sauce: converts the Route's Infallible to BoxError
                // so that AdmissionLayer is happy wrapping it.
                .map_err(BoxError::from),
        );

    // 3. Serve
    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000")
        .await
        .unwrap();
    println!("📡 Listening on http://127.0.0.1:3000");

    axum::serve(listener, app).await.unwrap();
}

/// The signature must match BoxError -> IntoResponse
async fn handle_drip_error(err: tower::BoxError) -> impl IntoResponse {
    if let Some(drip_err) = err.downcast_ref::<DripError>() {
        drip_err.clone().into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Service Error").into_response()
    }
}
