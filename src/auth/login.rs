use axum::{debug_handler, extract::{Path, Query, State}, response::Redirect};
use oauth2::{CsrfToken, PkceCodeChallenge, Scope};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{session::{CSRF_STATE, PKCE_VERIFIER, RETURN_URL}, AppResult, AppState};

use super::{clients::ClientProvider, Clients};

#[derive(Deserialize)]
pub(crate) struct LoginQuery {
    pub(crate) return_url: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    Path(provider): Path<ClientProvider>,
    Query(LoginQuery { return_url }): Query<LoginQuery>,
    State(clients): State<Clients>,
    session: Session,
) -> AppResult<Redirect> {
    let client = clients.get_client(provider)?;

    let (pkce_code_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let (authorize_url, csrf_state) = client.authorize_url(CsrfToken::new_random)
        .add_scope(Scope::new("openid".to_string()))
        .set_pkce_challenge(pkce_code_challenge)
        .url();

    session.insert(CSRF_STATE, csrf_state.secret()).await?;
    session.insert(PKCE_VERIFIER, pkce_verifier.secret()).await?;
    match return_url.as_deref().map(local_path) {
        Some(Some(path)) => session.insert(RETURN_URL, path).await?,
        Some(None) => tracing::debug!(?return_url, "ignoring off-site return url"),
        None => {}
    }

    tracing::debug!(%provider, "starting oauth login");
    Ok(Redirect::to(authorize_url.as_str()))
}

/// Only same-origin paths: `/rooms` yes, `//evil.example` or `https://..` no.
pub(crate) fn local_path(url: &str) -> Option<&str> {
    let rest = url.strip_prefix('/')?;
    if rest.starts_with('/') || url.contains(['\\', '\r', '\n']) {
        return None;
    }
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_local_paths_are_kept() {
        assert_eq!(local_path("/session"), Some("/session"));
        assert_eq!(local_path("/rooms/42?tab=chat"), Some("/rooms/42?tab=chat"));

        for url in ["https://evil.example", "//evil.example", "/\\evil.example", "evil", "", "/x\r\nLocation: y"] {
            assert_eq!(local_path(url), None, "{url}");
        }
    }
}
