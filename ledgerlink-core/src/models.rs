use serde::{Deserialize, Deserializer, Serialize};

use crate::sync::{Page, SyncCursor};

/// Lists the provider may send as `null` as well as leave out.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub account_id: String,
    pub amount: f64,
    #[serde(default)]
    pub iso_currency_code: Option<String>,
    #[serde(default)]
    pub unofficial_currency_code: Option<String>,
    /// Posting date, `YYYY-MM-DD`.
    pub date: String,
    #[serde(default)]
    pub authorized_date: Option<String>,
    pub name: String,
    #[serde(default)]
    pub merchant_name: Option<String>,
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub payment_channel: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub category: Vec<String>,
}

/// Reference to a transaction the provider no longer reports.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RemovedTransaction {
    pub transaction_id: String,
    #[serde(default)]
    pub account_id: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TransactionsSyncResponse {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub added: Vec<Transaction>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub modified: Vec<Transaction>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub removed: Vec<RemovedTransaction>,
    pub next_cursor: String,
    pub has_more: bool,
}

impl From<TransactionsSyncResponse> for Page<Transaction, RemovedTransaction> {
    fn from(response: TransactionsSyncResponse) -> Self {
        Page {
            added: response.added,
            modified: response.modified,
            removed: response.removed,
            has_more: response.has_more,
            next_cursor: SyncCursor::At(response.next_cursor),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Balances {
    #[serde(default)]
    pub available: Option<f64>,
    #[serde(default)]
    pub current: Option<f64>,
    #[serde(default)]
    pub limit: Option<f64>,
    #[serde(default)]
    pub iso_currency_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Account {
    pub account_id: String,
    pub name: String,
    #[serde(default)]
    pub official_name: Option<String>,
    #[serde(default)]
    pub mask: Option<String>,
    #[serde(rename = "type")]
    pub account_type: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub balances: Balances,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Item {
    pub item_id: String,
    #[serde(default)]
    pub institution_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub available_products: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub billed_products: Vec<String>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AccountsResponse {
    pub accounts: Vec<Account>,
    pub item: Item,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ItemResponse {
    pub item: Item,
    #[serde(default)]
    pub status: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LinkToken {
    pub link_token: String,
    pub expiration: String,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AccessTokenExchange {
    pub access_token: String,
    pub item_id: String,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AssetReportCreated {
    pub asset_report_token: String,
    pub asset_report_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AssetReport {
    pub report: serde_json::Value,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub warnings: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferUser {
    pub legal_name: String,
}

/// Transfer the provider should risk-check; `amount` is a decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferAuthorizationRequest {
    pub account_id: String,
    #[serde(rename = "type")]
    pub transfer_type: String,
    pub network: String,
    pub amount: String,
    pub ach_class: String,
    pub user: TransferUser,
}

impl TransferAuthorizationRequest {
    /// ACH debit pulled from a consumer account.
    pub fn ach_debit(
        account_id: impl Into<String>,
        amount: impl Into<String>,
        legal_name: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            transfer_type: "debit".to_string(),
            network: "ach".to_string(),
            amount: amount.into(),
            ach_class: "ppd".to_string(),
            user: TransferUser {
                legal_name: legal_name.into(),
            },
        }
    }
}

/// Error envelope the provider returns with non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ApiErrorDetail {
    pub error_type: String,
    pub error_code: String,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub display_message: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
}
