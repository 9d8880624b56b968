use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;

use super::{HealthResponse, PredictRequest, PredictResponse, ServiceContext, ServiceError};

struct ApiError(ServiceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        log::error!("Prediction failed: {}", self.0);
        let body = serde_json::json!({ "detail": self.0.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

async fn health(State(context): State<Arc<ServiceContext>>) -> Json<HealthResponse> {
    Json(context.health().await)
}

async fn predict(
    State(context): State<Arc<ServiceContext>>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, ApiError> {
    context.predict(request).await.map(Json).map_err(ApiError)
}

/// `GET /health` and `POST /predict` over one shared context.
pub fn router(context: Arc<ServiceContext>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .layer(CorsLayer::permissive())
        .with_state(context)
}

pub async fn serve(addr: SocketAddr, context: Arc<ServiceContext>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!(
        "Serving emotion predictions on http://{} (model dir {:?})",
        listener.local_addr()?,
        context.model_dir()
    );
    axum::serve(listener, router(context)).await
}
