use axum::{debug_handler, extract::{Path, Query, State}, response::Redirect};
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeVerifier, TokenResponse};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::{session::{CSRF_STATE, PKCE_VERIFIER, RETURN_URL, USER_ID}, AppResult, AppState, GetField, NexusError};

use super::{clients::ClientProvider, login::local_path, Clients};

#[derive(Deserialize)]
pub(crate) struct LockinQuery {
    pub(crate) state: Option<String>,
    pub(crate) code: Option<String>,
}

#[derive(Serialize)]
struct IdentityRequest {
    post_body: String,
    request_uri: String,
    return_idp_credential: bool,
    return_secure_token: bool,
}

/// OAuth callback: trades the code for a provider token, then the token for
/// a federated user id that keys the profile.
#[debug_handler(state = AppState)]
pub(crate) async fn lockin(
    Path(provider): Path<ClientProvider>,
    Query(LockinQuery { state, code }): Query<LockinQuery>,
    State(clients): State<Clients>,
    session: Session,
) -> AppResult<Redirect> {
    let state = CsrfToken::new(state.ok_or(NexusError::Invalid("oauth callback without state"))?);
    let code = AuthorizationCode::new(code.ok_or(NexusError::Invalid("oauth callback without code"))?);

    let Some(stored_state) = session.remove::<String>(CSRF_STATE).await? else {
        return Err(NexusError::Invalid("no login in progress"))?;
    };
    if state.secret().as_str() != stored_state.as_str() {
        return Err(NexusError::Invalid("csrf tokens don't match"))?;
    }

    let Some(pkce_verifier) = session.remove::<String>(PKCE_VERIFIER).await? else {
        return Err(NexusError::Invalid("no login in progress"))?;
    };

    let client = clients.get_client(provider)?;
    let http_client = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let token_result = client
        .exchange_code(code)
        .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
        .request_async(&http_client)
        .await?;

    let access_token = token_result.access_token().secret();
    let body: serde_json::Value = http_client.post(&clients.identity_url)
        .json(&IdentityRequest {
            post_body: format!("access_token={access_token}&providerId={}", provider.id()),
            request_uri: "http://localhost/".to_owned(),
            return_idp_credential: true,
            return_secure_token: true,
        })
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let user_id = body.get_str_field("localId")?;
    session.cycle_id().await?;
    session.insert(USER_ID, user_id.clone()).await?;

    tracing::info!(%provider, %user_id, "signed in");

    let return_url = session.remove::<String>(RETURN_URL).await?;
    Ok(Redirect::to(return_url.as_deref().and_then(local_path).unwrap_or("/session")))
}
