mod client;
mod link;
mod models;
pub mod poll;
pub mod sync;

pub use client::{ApiErrorClass, Credentials, Environment, ProviderClient, ProviderError};
pub use link::{LinkClient, LinkTokenRequest};
pub use models::{
    Account, AccessTokenExchange, AccountsResponse, ApiErrorDetail, AssetReport,
    AssetReportCreated, Balances, Item, ItemResponse, LinkToken, RemovedTransaction, Transaction,
    TransferAuthorizationRequest, TransferUser,
};
pub use poll::{PollError, RetryBudget, poll_until_ready};
pub use sync::{Page, SyncCursor, SyncError, SyncResult, sync_changes, sync_changes_from};
