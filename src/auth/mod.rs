use crate::state::AppState;
use axum::Router;

mod credentials;
mod dto;
pub mod handlers;
pub mod jwt;
pub(crate) mod extractors;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes())
}
