//! The coin shop. Items are a fixed catalogue compiled into the binary; a
//! purchase debits the balance and grants the item in one transaction.

mod buy;
mod catalog;

use axum::{debug_handler, routing::{get, post}, Json, Router};

use crate::AppState;

pub use buy::{buy_item, inventory, InventoryItem, Receipt};
pub use catalog::{find, Grant, StoreItem, CATALOGUE};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/inventory", get(buy::get_inventory))
        .route("/{item_key}/buy", post(buy::buy))
}

#[debug_handler(state = AppState)]
pub(crate) async fn list() -> Json<&'static [StoreItem]> {
    Json(CATALOGUE)
}
