pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;

use std::sync::Arc;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::{
    routing::{get, post},
    Router,
};
use service_core::middleware::{
    metrics::metrics_middleware,
    security_headers::security_headers_middleware,
    tracing::{make_request_span, request_id_middleware},
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use config::SchoolConfig;
use handlers::{fees, health, students};
use services::{
    FeeLedger, FeeStore, InMemoryFeeStore, InMemoryStudentStore, JwtService, StudentStore,
};

pub use startup::Application;

#[derive(Clone)]
pub struct AppState {
    pub config: SchoolConfig,
    pub ledger: FeeLedger,
    pub students: Arc<dyn StudentStore>,
    pub jwt: JwtService,
}

impl AppState {
    pub fn new(
        config: SchoolConfig,
        fees: Arc<dyn FeeStore>,
        students: Arc<dyn StudentStore>,
    ) -> Self {
        let jwt = JwtService::new(&config.jwt.secret);
        Self {
            ledger: FeeLedger::new(fees, students.clone()),
            students,
            jwt,
            config,
        }
    }

    /// State backed by process-local stores.
    pub fn in_memory(config: SchoolConfig) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryFeeStore::new()),
            Arc::new(InMemoryStudentStore::new()),
        )
    }
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/fees", get(fees::list_fees).post(fees::create_fee))
        .route("/fees/summary", get(fees::fee_summary))
        .route("/fees/student/:student_id", get(fees::list_student_fees))
        .route(
            "/fees/:id",
            get(fees::get_fee)
                .put(fees::update_fee)
                .delete(fees::delete_fee),
        )
        .route("/fees/:id/payments", post(fees::record_payment))
        .route(
            "/students",
            get(students::list_students).post(students::create_student),
        )
        .route("/students/:id", get(students::get_student))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_endpoint))
        .nest("/api", api)
        .nest_service("/uploads", ServeDir::new(&state.config.uploads_dir))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<axum::body::Body>))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
