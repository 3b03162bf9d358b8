//! HTTP surface (spec.md §6), versioned under `/v1`. Each module owns one
//! resource group; this file only wires routes to handlers.

pub mod auth;
pub mod certificates;
pub mod nginx;
pub mod projects;
pub mod routes;
pub mod services;
pub mod system;
pub mod tokens;

use axum::{
  Router,
  routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Builds the full `/v1` router. Unauthenticated routes (`health`,
/// `auth/login`) do their own gating inside the handler; everything else
/// relies on the [`crate::auth::AuthContext`] extractor to reject before
/// the handler body runs.
pub fn router() -> Router {
  let v1 = Router::new()
    .route("/health", get(system::health))
    .route("/system", get(system::system))
    .route("/projects", get(projects::list).post(projects::create))
    .route("/projects/{id}", get(projects::get).delete(projects::delete))
    .route(
      "/projects/{id}/services",
      get(services::list_for_project).post(services::create),
    )
    .route("/services/{id}", get(services::get).delete(services::delete))
    .route("/services/{id}/routes", get(routes::list_for_service).post(routes::create))
    .route("/services/{id}/start", post(services::start))
    .route("/services/{id}/stop", post(services::stop))
    .route("/services/{id}/restart", post(services::restart))
    .route("/services/{id}/deploy", post(services::deploy))
    .route("/services/{id}/unlock", post(services::unlock_crashloop))
    .route("/services/{id}/logs/tail", get(services::logs_tail))
    .route("/services/{id}/stats", get(services::stats))
    .route("/services/{id}/links", get(services::get_links).post(services::reconnect_links))
    .route("/services/{id}/network", get(services::network))
    .route("/routes", get(routes::list_all))
    .route("/routes/{id}", get(routes::get).delete(routes::delete))
    .route("/certificates", get(certificates::list).post(certificates::create))
    .route(
      "/certificates/{id}",
      get(certificates::get).delete(certificates::delete),
    )
    .route("/certificates/{id}/renew", post(certificates::renew))
    .route("/nginx/reload", post(nginx::reload))
    .route("/nginx/status", get(nginx::status))
    .route("/nginx/config", get(nginx::config))
    .route("/nginx/validate", post(nginx::validate))
    .route("/tokens", get(tokens::list).post(tokens::create))
    .route("/tokens/{name}", delete(tokens::delete))
    .route("/auth/login", post(auth::login))
    .route("/auth/logout", post(auth::logout))
    .route("/auth/me", get(auth::me));

  Router::new()
    .nest("/v1", v1)
    .layer(CorsLayer::permissive())
    .layer(TraceLayer::new_for_http())
}
