use ledgerlink_core::{
    AssetReport, PollError, ProviderClient, ProviderError, RemovedTransaction, RetryBudget,
    SyncCursor, SyncError, SyncResult, Transaction, poll_until_ready, sync_changes_from,
};
use thiserror::Error;
use time::Date;
use time::format_description::well_known::Iso8601;
use tokio_util::sync::CancellationToken;

pub type TransactionSync = SyncResult<Transaction, RemovedTransaction>;

#[derive(Debug, Clone, PartialEq)]
pub struct AssetReportBundle {
    pub report: AssetReport,
    pub pdf: Vec<u8>,
    pub token: String,
}

#[derive(Debug, Error)]
pub enum AssetReportError {
    #[error("asset report request failed: {0}")]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Poll(#[from] PollError<ProviderError>),
}

/// Drains the transactions changefeed for one item starting at `from`.
pub async fn fetch_transactions(
    client: &ProviderClient,
    access_token: &str,
    from: SyncCursor,
    page_size: u32,
    cancel: &CancellationToken,
) -> Result<TransactionSync, SyncError<ProviderError>> {
    sync_changes_from(
        from,
        |cursor| async move {
            client
                .sync_transactions(access_token, &cursor, page_size)
                .await
        },
        cancel,
    )
    .await
}

/// The `n` most recent transactions, oldest first.
///
/// Sorting is stable and dates that do not parse sort before every real
/// date, so they drop out of the window first.
pub fn recent_transactions(added: &[Transaction], n: usize) -> Vec<Transaction> {
    let mut sorted: Vec<&Transaction> = added.iter().collect();
    sorted.sort_by_key(|tx| Date::parse(&tx.date, &Iso8601::DATE).ok());
    let skip = sorted.len().saturating_sub(n);
    sorted.into_iter().skip(skip).cloned().collect()
}

/// Creates an asset report, waits for it to become ready and fetches the
/// rendered PDF.
pub async fn fetch_asset_report(
    client: &ProviderClient,
    access_token: &str,
    days_requested: u32,
    budget: RetryBudget,
    cancel: &CancellationToken,
) -> Result<AssetReportBundle, AssetReportError> {
    let created = client
        .create_asset_report(&[access_token], days_requested, None)
        .await?;
    let token = created.asset_report_token;

    let report = poll_until_ready(|| client.get_asset_report(&token), budget, cancel).await?;
    let pdf = client.get_asset_report_pdf(&token).await?;

    Ok(AssetReportBundle { report, pdf, token })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(id: &str, date: &str) -> Transaction {
        Transaction {
            transaction_id: id.to_string(),
            account_id: "acc-1".to_string(),
            amount: 1.0,
            iso_currency_code: Some("USD".to_string()),
            unofficial_currency_code: None,
            date: date.to_string(),
            authorized_date: None,
            name: id.to_string(),
            merchant_name: None,
            pending: false,
            payment_channel: None,
            category: Vec::new(),
        }
    }

    fn ids(list: &[Transaction]) -> Vec<&str> {
        list.iter().map(|tx| tx.transaction_id.as_str()).collect()
    }

    #[test]
    fn keeps_most_recent_oldest_first() {
        let added = vec![
            tx("c", "2024-03-01"),
            tx("a", "2024-01-01"),
            tx("d", "2024-04-01"),
            tx("b", "2024-02-01"),
        ];

        let recent = recent_transactions(&added, 2);
        assert_eq!(ids(&recent), vec!["c", "d"]);
    }

    #[test]
    fn equal_dates_keep_input_order() {
        let added = vec![
            tx("x", "2024-05-05"),
            tx("y", "2024-05-05"),
            tx("z", "2024-05-05"),
        ];

        assert_eq!(ids(&recent_transactions(&added, 2)), vec!["y", "z"]);
    }

    #[test]
    fn unparsable_dates_sort_first() {
        let added = vec![tx("bad", "yesterday"), tx("ok", "2024-01-01")];

        assert_eq!(ids(&recent_transactions(&added, 2)), vec!["bad", "ok"]);
        assert_eq!(ids(&recent_transactions(&added, 1)), vec!["ok"]);
    }

    #[test]
    fn window_larger_than_input_returns_everything() {
        let added = vec![tx("a", "2024-01-02"), tx("a", "2024-01-02")];

        assert_eq!(recent_transactions(&added, 8).len(), 2);
        assert!(recent_transactions(&[], 8).is_empty());
        assert!(recent_transactions(&added, 0).is_empty());
    }
}
