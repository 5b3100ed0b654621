mod clients;
mod login;
mod lockin;
mod logout;
mod signup;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub use clients::{ClientProvider, Clients};
pub(crate) use signup::HANDLE_MAX;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login/{provider}", get(login::login))
        .route("/lockin/{provider}", get(lockin::lockin))
        .route("/logout", post(logout::logout))
        .route("/signup", post(signup::signup))
}
