mod edit;
mod report;
mod view;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub use view::{Badge, ProfileView};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(view::me).patch(edit::edit))
        .route("/{profile_id}", get(view::by_id))
        .route("/{profile_id}/report", post(report::report))
}
