use serde::Serialize;

use crate::client::{Credentials, Environment, ProviderClient, ProviderError};
use crate::models::{AccessTokenExchange, LinkToken};

#[derive(Debug, Clone, Serialize)]
struct LinkUser<'a> {
    client_user_id: &'a str,
}

/// Parameters for a link token, the short-lived token the client
/// application uses to open the provider's account-linking flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTokenRequest {
    pub client_user_id: String,
    pub client_name: String,
    pub products: Vec<String>,
    pub country_codes: Vec<String>,
    pub language: String,
    pub redirect_uri: Option<String>,
    pub android_package_name: Option<String>,
}

impl LinkTokenRequest {
    pub fn new(client_user_id: impl Into<String>, client_name: impl Into<String>) -> Self {
        Self {
            client_user_id: client_user_id.into(),
            client_name: client_name.into(),
            products: vec!["transactions".to_string()],
            country_codes: vec!["US".to_string()],
            language: "en".to_string(),
            redirect_uri: None,
            android_package_name: None,
        }
    }
}

#[derive(Serialize)]
struct LinkTokenBody<'a> {
    user: LinkUser<'a>,
    client_name: &'a str,
    products: &'a [String],
    country_codes: &'a [String],
    language: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_uri: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    android_package_name: Option<&'a str>,
}

/// Account-linking endpoints. Shares transport and credentials with the
/// [`ProviderClient`] it is built from.
#[derive(Clone)]
pub struct LinkClient {
    provider: ProviderClient,
}

impl From<ProviderClient> for LinkClient {
    fn from(provider: ProviderClient) -> Self {
        Self { provider }
    }
}

impl LinkClient {
    pub fn new(environment: Environment, credentials: Credentials) -> Result<Self, ProviderError> {
        ProviderClient::new(environment, credentials).map(Self::from)
    }

    pub fn with_base_url(base_url: &str, credentials: Credentials) -> Result<Self, ProviderError> {
        ProviderClient::with_base_url(base_url, credentials).map(Self::from)
    }

    pub async fn create_link_token(
        &self,
        request: &LinkTokenRequest,
    ) -> Result<LinkToken, ProviderError> {
        let body = LinkTokenBody {
            user: LinkUser {
                client_user_id: &request.client_user_id,
            },
            client_name: &request.client_name,
            products: &request.products,
            country_codes: &request.country_codes,
            language: &request.language,
            redirect_uri: request.redirect_uri.as_deref(),
            android_package_name: request.android_package_name.as_deref(),
        };
        self.provider.post("/link/token/create", &body).await
    }

    /// Trades the public token handed back by the linking flow for a
    /// long-lived access token.
    pub async fn exchange_public_token(
        &self,
        public_token: &str,
    ) -> Result<AccessTokenExchange, ProviderError> {
        self.provider
            .post(
                "/item/public_token/exchange",
                &serde_json::json!({ "public_token": public_token }),
            )
            .await
    }
}
