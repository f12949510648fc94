// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, bank, practice, privacy, report, session},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware, teacher_middleware},
};

/// Assembles the main application router.
///
/// * Public: auth.
/// * Authenticated: practices, sessions, personal data.
/// * Teacher: question bank. Admin: users and data erasure.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth_layer = middleware::from_fn_with_state(state.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let bank_routes = Router::new()
        .route("/categories", get(bank::list_categories).post(bank::create_category))
        .route("/categories/{id}", delete(bank::delete_category))
        .route("/questions", post(bank::create_question))
        .route(
            "/questions/{id}",
            put(bank::update_question).delete(bank::delete_question),
        )
        // Auth runs first, then the role check
        .layer(middleware::from_fn(teacher_middleware))
        .layer(auth_layer.clone());

    // Teacher-only practice endpoints check the role inside the handler
    let practice_routes = Router::new()
        .route("/", get(practice::list_practices).post(practice::create_practice))
        .route(
            "/{id}",
            get(practice::get_practice)
                .put(practice::update_practice)
                .delete(practice::delete_practice),
        )
        .route("/{id}/categories", get(practice::offered_categories))
        .route("/{id}/settings/categories", get(practice::settings_categories))
        .route(
            "/{id}/sessions",
            get(session::list_my_sessions).post(session::start_session),
        )
        .route("/{id}/sessions/latest", get(session::latest_session))
        .route("/{id}/report", get(report::practice_report))
        .layer(auth_layer.clone());

    let session_routes = Router::new()
        .route("/{id}", get(session::get_session).delete(session::delete_session))
        .route("/{id}/next", post(session::next_question))
        .route("/{id}/attempts/{slot}", post(session::answer_question))
        .route("/{id}/finish", post(session::finish_session))
        .route("/{id}/report", get(report::session_category_report))
        .layer(auth_layer.clone());

    let me_routes = Router::new()
        .route(
            "/data",
            get(privacy::export_my_data).delete(privacy::erase_my_data),
        )
        .layer(auth_layer.clone());

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users).post(admin::create_user))
        .route(
            "/users/{id}",
            put(admin::update_user).delete(admin::delete_user),
        )
        .route("/practices/{id}/erase", post(privacy::erase_practice_users))
        .layer(middleware::from_fn(admin_middleware))
        .layer(auth_layer);

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/bank", bank_routes)
        .nest("/api/practices", practice_routes)
        .nest("/api/sessions", session_routes)
        .nest("/api/me", me_routes)
        .nest("/api/admin", admin_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
