use axum::{Router, routing::get};

pub mod auth;
pub mod menus;
pub mod roles;
pub mod system;
pub mod users;

/// Every route. Which ones need a token is decided by the auth middleware's
/// skip list, not here.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .nest(
            "/api/v1/identity",
            Router::new()
                .nest("/auth", auth::router())
                .nest("/users", users::router()),
        )
        .nest(
            "/api/v1/permission",
            Router::new()
                .nest("/roles", roles::router())
                .nest("/menus", menus::router()),
        )
        .fallback(system::not_found)
}
