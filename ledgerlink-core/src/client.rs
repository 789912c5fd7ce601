use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::models::{
    AccountsResponse, ApiErrorDetail, AssetReport, AssetReportCreated, ItemResponse,
    RemovedTransaction, Transaction, TransactionsSyncResponse, TransferAuthorizationRequest,
};
use crate::sync::{Page, SyncCursor};

const CLIENT_ID_HEADER: &str = "plaid-client-id";
const SECRET_HEADER: &str = "plaid-secret";

#[derive(Serialize)]
struct TransferAuthorizationBody<'a> {
    access_token: &'a str,
    #[serde(flatten)]
    request: &'a TransferAuthorizationRequest,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("credentials are not valid header values: {0}")]
    Credentials(#[from] InvalidHeaderValue),
    #[error("api returned {status}: {body}")]
    Api {
        status: StatusCode,
        detail: Option<ApiErrorDetail>,
        body: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    /// The requested product is still being prepared; ask again later.
    NotReady,
    Permanent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Sandbox,
    Development,
    Production,
}

impl Environment {
    pub fn base_url(self) -> &'static str {
        match self {
            Environment::Sandbox => "https://sandbox.plaid.com",
            Environment::Development => "https://development.plaid.com",
            Environment::Production => "https://production.plaid.com",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Some(Environment::Sandbox),
            "development" => Some(Environment::Development),
            "production" => Some(Environment::Production),
            _ => None,
        }
    }
}

/// Client id/secret pair sent with every request.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            secret: secret.into(),
        }
    }

    fn headers(&self) -> Result<HeaderMap, ProviderError> {
        let mut secret = HeaderValue::from_str(&self.secret)?;
        secret.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(CLIENT_ID_HEADER, HeaderValue::from_str(&self.client_id)?);
        headers.insert(SECRET_HEADER, secret);
        Ok(headers)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct ProviderClient {
    http: Client,
    base_url: Url,
    headers: HeaderMap,
}

impl ProviderClient {
    pub fn new(environment: Environment, credentials: Credentials) -> Result<Self, ProviderError> {
        Self::with_base_url(environment.base_url(), credentials)
    }

    /// Fails when the URL does not parse or the credentials cannot be sent
    /// as header values.
    pub fn with_base_url(base_url: &str, credentials: Credentials) -> Result<Self, ProviderError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            headers: credentials.headers()?,
        })
    }

    /// Fetches one page of the transactions changefeed.
    ///
    /// `SyncCursor::Start` is sent by leaving the cursor out of the request.
    pub async fn sync_transactions(
        &self,
        access_token: &str,
        cursor: &SyncCursor,
        count: u32,
    ) -> Result<Page<Transaction, RemovedTransaction>, ProviderError> {
        let mut body = json!({
            "access_token": access_token,
            "count": count,
        });
        if let Some(token) = cursor.token() {
            body["cursor"] = Value::String(token.to_string());
        }
        let response: TransactionsSyncResponse = self.post("/transactions/sync", &body).await?;
        Ok(response.into())
    }

    pub async fn get_accounts(&self, access_token: &str) -> Result<AccountsResponse, ProviderError> {
        self.post("/accounts/get", &json!({ "access_token": access_token }))
            .await
    }

    pub async fn get_balance(&self, access_token: &str) -> Result<AccountsResponse, ProviderError> {
        self.post(
            "/accounts/balance/get",
            &json!({ "access_token": access_token }),
        )
        .await
    }

    pub async fn get_item(&self, access_token: &str) -> Result<ItemResponse, ProviderError> {
        self.post("/item/get", &json!({ "access_token": access_token }))
            .await
    }

    pub async fn get_identity(&self, access_token: &str) -> Result<Value, ProviderError> {
        self.post("/identity/get", &json!({ "access_token": access_token }))
            .await
    }

    pub async fn get_holdings(&self, access_token: &str) -> Result<Value, ProviderError> {
        self.post(
            "/investments/holdings/get",
            &json!({ "access_token": access_token }),
        )
        .await
    }

    pub async fn get_liabilities(&self, access_token: &str) -> Result<Value, ProviderError> {
        self.post("/liabilities/get", &json!({ "access_token": access_token }))
            .await
    }

    /// Asks the provider to risk-check a transfer before it is created.
    /// The authorization decision comes back unchanged.
    pub async fn authorize_transfer(
        &self,
        access_token: &str,
        request: &TransferAuthorizationRequest,
    ) -> Result<Value, ProviderError> {
        self.post(
            "/transfer/authorization/create",
            &TransferAuthorizationBody {
                access_token,
                request,
            },
        )
        .await
    }

    /// Starts building an asset report. The report is not ready yet when
    /// this returns; poll [`ProviderClient::get_asset_report`].
    pub async fn create_asset_report(
        &self,
        access_tokens: &[&str],
        days_requested: u32,
        client_report_id: Option<&str>,
    ) -> Result<AssetReportCreated, ProviderError> {
        let mut body = json!({
            "access_tokens": access_tokens,
            "days_requested": days_requested,
        });
        if let Some(id) = client_report_id {
            body["options"] = json!({ "client_report_id": id });
        }
        self.post("/asset_report/create", &body).await
    }

    /// Fails with `error_code = PRODUCT_NOT_READY` while the report is
    /// still being generated.
    pub async fn get_asset_report(
        &self,
        asset_report_token: &str,
    ) -> Result<AssetReport, ProviderError> {
        self.post(
            "/asset_report/get",
            &json!({
                "asset_report_token": asset_report_token,
                "include_insights": false,
            }),
        )
        .await
    }

    pub async fn get_asset_report_pdf(
        &self,
        asset_report_token: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .send(
                "/asset_report/pdf/get",
                &json!({ "asset_report_token": asset_report_token }),
            )
            .await?;
        if response.status().is_success() {
            Ok(response.bytes().await?.to_vec())
        } else {
            Err(ProviderError::from_response(response).await)
        }
    }

    pub(crate) async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ProviderError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(path, body).await?;
        handle_response(response).await
    }

    async fn send<B>(&self, path: &str, body: &B) -> Result<reqwest::Response, ProviderError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(path)?;
        debug!(%url, "provider request");
        Ok(self
            .http
            .post(url)
            .headers(self.headers.clone())
            .json(body)
            .send()
            .await?)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        Ok(self.base_url.join(path)?)
    }
}

async fn handle_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    if response.status().is_success() {
        Ok(response.json::<T>().await?)
    } else {
        Err(ProviderError::from_response(response).await)
    }
}

impl ProviderError {
    async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ApiErrorDetail>(&body).ok();
        ProviderError::Api {
            status,
            detail,
            body,
        }
    }

    pub fn detail(&self) -> Option<&ApiErrorDetail> {
        match self {
            ProviderError::Api { detail, .. } => detail.as_ref(),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ProviderError::Api { status, .. } => Some(*status),
            ProviderError::Request(err) => err.status(),
            ProviderError::Url(_) | ProviderError::Credentials(_) => None,
        }
    }

    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            ProviderError::Api { status, detail, .. } => Some(classify_api_error(
                *status,
                detail.as_ref().map(|d| d.error_code.as_str()),
            )),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient | ApiErrorClass::NotReady)
        )
    }

    pub fn is_not_ready(&self) -> bool {
        self.classification() == Some(ApiErrorClass::NotReady)
    }
}

fn classify_api_error(status: StatusCode, error_code: Option<&str>) -> ApiErrorClass {
    match error_code {
        Some("PRODUCT_NOT_READY") => return ApiErrorClass::NotReady,
        Some("RATE_LIMIT_EXCEEDED") => return ApiErrorClass::RateLimit,
        Some("ITEM_LOGIN_REQUIRED" | "INVALID_ACCESS_TOKEN" | "INVALID_API_KEYS") => {
            return ApiErrorClass::Auth;
        }
        _ => {}
    }
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_EARLY
        )
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}
