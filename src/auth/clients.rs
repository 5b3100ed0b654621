use std::fmt;

use oauth2::{basic::BasicClient, AuthUrl, Client, ClientId, ClientSecret, RedirectUrl, TokenUrl};
use serde::Deserialize;
use serde_json::Value;

use crate::{AppResult, GetField, NexusError};

type ProviderClient = Client<oauth2::StandardErrorResponse<oauth2::basic::BasicErrorResponseType>, oauth2::StandardTokenResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardTokenIntrospectionResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardRevocableToken, oauth2::StandardErrorResponse<oauth2::RevocationErrorResponseType>, oauth2::EndpointSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointSet>;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientProvider {
    Google,
    Github,
}

impl ClientProvider {
    /// Provider id as the identity toolkit expects it.
    pub fn id(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "google.com",
            Github => "github.com",
        }
    }

    fn slug(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "google",
            Github => "github",
        }
    }

    fn endpoints(&self) -> (&'static str, &'static str) {
        use ClientProvider::*;
        match self {
            Google => ("https://accounts.google.com/o/oauth2/auth", "https://oauth2.googleapis.com/token"),
            Github => ("https://github.com/login/oauth/authorize", "https://github.com/login/oauth/access_token"),
        }
    }
}

impl fmt::Display for ClientProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// OAuth clients plus the federated identity endpoint that turns a provider
/// token into a stable user id.
#[derive(Clone)]
pub struct Clients {
    pub(crate) identity_url: String,
    google_client: Option<ProviderClient>,
    github_client: Option<ProviderClient>,
}

impl Clients {
    pub fn from_json(json: Value, public_url: &str) -> AppResult<Clients> {
        let identity_url = format!(
            "https://identitytoolkit.googleapis.com/v1/accounts:signInWithIdp?key={}",
            json.get_obj_field("firebase")?.get_str_field("apikey")?
        );

        Ok(
            Clients {
                identity_url,
                google_client: provider_client(&json, ClientProvider::Google, public_url)?,
                github_client: provider_client(&json, ClientProvider::Github, public_url)?,
            }
        )
    }

    pub fn get_client(&self, provider: ClientProvider) -> AppResult<ProviderClient> {
        use ClientProvider::*;
        match provider {
            Google => self.google_client.clone(),
            Github => self.github_client.clone(),
        }.ok_or_else(|| NexusError::NotFound("oauth provider").into())
    }
}

fn provider_client(json: &Value, provider: ClientProvider, public_url: &str) -> AppResult<Option<ProviderClient>> {
    let Some(json) = json.get(provider.slug()) else {
        return Ok(None);
    };
    let client_id = ClientId::new(json.get_str_field("client_id")?);
    let client_secret = ClientSecret::new(json.get_str_field("client_secret")?);

    let (auth_url, token_url) = provider.endpoints();
    let redirect_url = format!("{}/lockin/{}", public_url.trim_end_matches('/'), provider.slug());

    Ok(Some(
        BasicClient::new(client_id)
            .set_client_secret(client_secret)
            .set_auth_uri(AuthUrl::new(auth_url.to_owned())?)
            .set_token_uri(TokenUrl::new(token_url.to_owned())?)
            .set_redirect_uri(RedirectUrl::new(redirect_url)?)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_configured_providers_are_available() {
        let secrets = json!({
            "firebase": { "apikey": "key123" },
            "github": { "client_id": "id", "client_secret": "secret" },
        });
        let clients = Clients::from_json(secrets, "http://localhost:8080/").unwrap();

        assert!(clients.identity_url.ends_with("key=key123"));
        assert!(clients.get_client(ClientProvider::Github).is_ok());
        let err = clients.get_client(ClientProvider::Google).unwrap_err();
        assert!(matches!(err.nexus(), Some(NexusError::NotFound(_))));
    }

    #[test]
    fn identity_key_is_required() {
        assert!(Clients::from_json(json!({}), "http://localhost").is_err());
    }
}
