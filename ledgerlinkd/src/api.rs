use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequestParts, Query, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, request::Parts},
    routing::{delete, get, post},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use ledgerlink_core::{
    AccountsResponse, ItemResponse, LinkClient, ProviderClient, ProviderError, SyncCursor,
    Transaction, TransferAuthorizationRequest,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{ApiError, ApiResult};
use crate::service::{fetch_asset_report, fetch_transactions, recent_transactions};
use crate::session::{SessionId, SessionState, SessionStore};

pub const SESSION_HEADER: &str = "x-session-id";

pub struct AppState {
    pub provider: ProviderClient,
    pub link: LinkClient,
    pub sessions: SessionStore,
    pub config: ServerConfig,
    /// Cancelled on shutdown; long-running routes work on child tokens.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: ServerConfig, shutdown: CancellationToken) -> Result<Self, ProviderError> {
        let provider =
            ProviderClient::with_base_url(config.provider_base_url(), config.credentials.clone())?;
        Ok(Self {
            link: LinkClient::from(provider.clone()),
            provider,
            sessions: SessionStore::new(),
            config,
            shutdown,
        })
    }
}

/// The caller's session, resolved from the `x-session-id` header.
pub struct CurrentSession {
    pub id: SessionId,
    pub state: SessionState,
}

impl FromRequestParts<Arc<AppState>> for CurrentSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let id = session_id_from(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {SESSION_HEADER} header")))?;
        let session = state
            .sessions
            .get(&id)
            .await
            .ok_or_else(|| ApiError::Unauthorized("unknown session".to_string()))?;
        Ok(Self { id, state: session })
    }
}

fn session_id_from(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(SessionId::from)
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
struct InfoResponse {
    item_id: Option<String>,
    products: Vec<String>,
}

async fn info(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Json<InfoResponse> {
    let item_id = match session_id_from(&headers) {
        Some(id) => state.sessions.get(&id).await.map(|session| session.item_id),
        None => None,
    };
    Json(InfoResponse {
        item_id,
        products: state.config.products.clone(),
    })
}

#[derive(Debug, Serialize)]
struct LinkTokenResponse {
    link_token: String,
    expiration: String,
}

async fn create_link_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<LinkTokenResponse>> {
    let client_user_id = session_id_from(&headers).unwrap_or_else(SessionId::generate);
    let request = state.config.link_request(client_user_id.as_str());
    let token = state.link.create_link_token(&request).await?;
    Ok(Json(LinkTokenResponse {
        link_token: token.link_token,
        expiration: token.expiration,
    }))
}

#[derive(Debug, Deserialize)]
struct SetAccessTokenRequest {
    public_token: String,
}

#[derive(Debug, Serialize)]
struct SetAccessTokenResponse {
    session_id: String,
    item_id: String,
}

async fn set_access_token(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SetAccessTokenRequest>, JsonRejection>,
) -> ApiResult<Json<SetAccessTokenResponse>> {
    let Json(payload) = payload?;
    if payload.public_token.trim().is_empty() {
        return Err(ApiError::BadRequest("public_token is empty".to_string()));
    }
    let exchange = state.link.exchange_public_token(&payload.public_token).await?;
    let session = SessionState::from_exchange(&exchange);
    let id = state.sessions.create(session).await;
    info!(item_id = %exchange.item_id, "session created");
    Ok(Json(SetAccessTokenResponse {
        session_id: id.to_string(),
        item_id: exchange.item_id,
    }))
}

#[derive(Debug, Default, Deserialize)]
struct TransactionsQuery {
    #[serde(default)]
    incremental: bool,
}

#[derive(Debug, Serialize)]
struct TransactionsResponse {
    latest_transactions: Vec<Transaction>,
    added: usize,
    modified: usize,
    removed: usize,
    pages: usize,
}

async fn transactions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TransactionsQuery>,
    session: CurrentSession,
) -> ApiResult<Json<TransactionsResponse>> {
    let seen = session.state.transactions_cursor.clone();
    let from = if query.incremental {
        seen.clone()
    } else {
        SyncCursor::Start
    };
    let cancel = state.shutdown.child_token();
    let result = fetch_transactions(
        &state.provider,
        &session.state.access_token,
        from,
        state.config.sync_page_size,
        &cancel,
    )
    .await?;

    if !state
        .sessions
        .advance_cursor(&session.id, &seen, result.cursor.clone())
        .await
    {
        warn!(
            item_id = %session.state.item_id,
            "transactions cursor moved during sync; keeping the newer one"
        );
    }
    info!(
        item_id = %session.state.item_id,
        pages = result.pages,
        added = result.added.len(),
        modified = result.modified.len(),
        removed = result.removed.len(),
        "transactions synced"
    );

    Ok(Json(TransactionsResponse {
        latest_transactions: recent_transactions(
            &result.added,
            state.config.recent_transactions,
        ),
        added: result.added.len(),
        modified: result.modified.len(),
        removed: result.removed.len(),
        pages: result.pages,
    }))
}

async fn accounts(
    State(state): State<Arc<AppState>>,
    session: CurrentSession,
) -> ApiResult<Json<AccountsResponse>> {
    Ok(Json(
        state.provider.get_accounts(&session.state.access_token).await?,
    ))
}

async fn balance(
    State(state): State<Arc<AppState>>,
    session: CurrentSession,
) -> ApiResult<Json<AccountsResponse>> {
    Ok(Json(
        state.provider.get_balance(&session.state.access_token).await?,
    ))
}

async fn item(
    State(state): State<Arc<AppState>>,
    session: CurrentSession,
) -> ApiResult<Json<ItemResponse>> {
    Ok(Json(
        state.provider.get_item(&session.state.access_token).await?,
    ))
}

async fn identity(
    State(state): State<Arc<AppState>>,
    session: CurrentSession,
) -> ApiResult<Json<Value>> {
    Ok(Json(
        state.provider.get_identity(&session.state.access_token).await?,
    ))
}

async fn holdings(
    State(state): State<Arc<AppState>>,
    session: CurrentSession,
) -> ApiResult<Json<Value>> {
    Ok(Json(
        state.provider.get_holdings(&session.state.access_token).await?,
    ))
}

async fn liabilities(
    State(state): State<Arc<AppState>>,
    session: CurrentSession,
) -> ApiResult<Json<Value>> {
    Ok(Json(
        state
            .provider
            .get_liabilities(&session.state.access_token)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct TransferQuery {
    account_id: Option<String>,
    #[serde(default = "default_transfer_amount")]
    amount: String,
    #[serde(default = "default_legal_name")]
    legal_name: String,
}

fn default_transfer_amount() -> String {
    "1.00".to_string()
}

fn default_legal_name() -> String {
    "FirstName LastName".to_string()
}

/// Authorizes an ACH debit from `account_id`, or from the item's first
/// account when none is given.
async fn transfer_authorize(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TransferQuery>,
    session: CurrentSession,
) -> ApiResult<Json<Value>> {
    let access_token = &session.state.access_token;
    let account_id = match query.account_id {
        Some(id) => id,
        None => state
            .provider
            .get_accounts(access_token)
            .await?
            .accounts
            .into_iter()
            .next()
            .map(|account| account.account_id)
            .ok_or_else(|| ApiError::BadRequest("item has no accounts".to_string()))?,
    };
    let request =
        TransferAuthorizationRequest::ach_debit(account_id, query.amount, query.legal_name);
    let authorization = state
        .provider
        .authorize_transfer(access_token, &request)
        .await?;
    info!(
        item_id = %session.state.item_id,
        account_id = %request.account_id,
        "transfer authorization requested"
    );
    Ok(Json(authorization))
}

#[derive(Debug, Serialize)]
struct AssetsResponse {
    json: Value,
    pdf: String,
}

async fn assets(
    State(state): State<Arc<AppState>>,
    session: CurrentSession,
) -> ApiResult<Json<AssetsResponse>> {
    let cancel = state.shutdown.child_token();
    let bundle = fetch_asset_report(
        &state.provider,
        &session.state.access_token,
        state.config.asset_report_days,
        state.config.retry_budget(),
        &cancel,
    )
    .await?;
    state
        .sessions
        .set_asset_report_token(&session.id, bundle.token.clone())
        .await;
    info!(
        item_id = %session.state.item_id,
        pdf_bytes = bundle.pdf.len(),
        "asset report ready"
    );

    Ok(Json(AssetsResponse {
        json: bundle.report.report,
        pdf: BASE64.encode(&bundle.pdf),
    }))
}

async fn end_session(
    State(state): State<Arc<AppState>>,
    session: CurrentSession,
) -> StatusCode {
    state.sessions.remove(&session.id).await;
    info!(item_id = %session.state.item_id, "session removed");
    StatusCode::NO_CONTENT
}

fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/info", post(info))
        .route("/create_link_token", post(create_link_token))
        .route("/set_access_token", post(set_access_token))
        .route("/transactions", get(transactions))
        .route("/accounts", get(accounts))
        .route("/balance", get(balance))
        .route("/identity", get(identity))
        .route("/holdings", get(holdings))
        .route("/liabilities", get(liabilities))
        .route("/transfer_authorize", get(transfer_authorize))
        .route("/item", get(item))
        .route("/assets", get(assets))
        .route("/session", delete(end_session))
}

pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
