use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::time::Duration;

use ledgerlink_core::{Credentials, Environment, LinkTokenRequest, RetryBudget};
use thiserror::Error;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_CLIENT_NAME: &str = "Ledgerlink";
const DEFAULT_PRODUCTS: &str = "transactions";
const DEFAULT_COUNTRY_CODES: &str = "US";
const DEFAULT_SYNC_PAGE_SIZE: u64 = 100;
const MAX_SYNC_PAGE_SIZE: u64 = 500;
const DEFAULT_RECENT_TRANSACTIONS: u64 = 8;
const DEFAULT_ASSET_REPORT_DAYS: u64 = 10;
const DEFAULT_ASSET_POLL_MS: u64 = 1000;
const DEFAULT_ASSET_POLL_ATTEMPTS: u64 = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required setting {0} is not set")]
    Missing(&'static str),
    #[error("unknown provider environment: {0}")]
    InvalidEnvironment(String),
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub credentials: Credentials,
    pub environment: Environment,
    pub base_url: Option<String>,
    pub client_name: String,
    pub products: Vec<String>,
    pub country_codes: Vec<String>,
    pub redirect_uri: Option<String>,
    pub android_package_name: Option<String>,
    pub sync_page_size: u32,
    pub recent_transactions: usize,
    pub asset_report_days: u32,
    pub asset_poll_delay: Duration,
    pub asset_poll_attempts: NonZeroU32,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any name -> value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let optional = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let number = |name: &str, default: u64| read_u64(lookup(name), default);

        let client_id = required("PLAID_CLIENT_ID")?;
        let secret = required("PLAID_SECRET")?;
        let environment = match optional("PLAID_ENV") {
            Some(value) => {
                Environment::parse(&value).ok_or(ConfigError::InvalidEnvironment(value))?
            }
            None => Environment::Sandbox,
        };
        let port = u16::try_from(number("APP_PORT", u64::from(DEFAULT_PORT)))
            .unwrap_or(DEFAULT_PORT);

        Ok(Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            credentials: Credentials::new(client_id, secret),
            environment,
            base_url: optional("PLAID_BASE_URL"),
            client_name: optional("LEDGERLINK_CLIENT_NAME")
                .unwrap_or_else(|| DEFAULT_CLIENT_NAME.to_string()),
            products: split_list(
                &optional("PLAID_PRODUCTS").unwrap_or_else(|| DEFAULT_PRODUCTS.to_string()),
            ),
            country_codes: split_list(
                &optional("PLAID_COUNTRY_CODES")
                    .unwrap_or_else(|| DEFAULT_COUNTRY_CODES.to_string()),
            ),
            redirect_uri: optional("PLAID_REDIRECT_URI"),
            android_package_name: optional("PLAID_ANDROID_PACKAGE_NAME"),
            sync_page_size: number("LEDGERLINK_SYNC_PAGE_SIZE", DEFAULT_SYNC_PAGE_SIZE)
                .min(MAX_SYNC_PAGE_SIZE) as u32,
            recent_transactions: number(
                "LEDGERLINK_RECENT_TRANSACTIONS",
                DEFAULT_RECENT_TRANSACTIONS,
            ) as usize,
            asset_report_days: number("LEDGERLINK_ASSET_REPORT_DAYS", DEFAULT_ASSET_REPORT_DAYS)
                .min(u64::from(u32::MAX)) as u32,
            asset_poll_delay: Duration::from_millis(number(
                "LEDGERLINK_ASSET_POLL_MS",
                DEFAULT_ASSET_POLL_MS,
            )),
            asset_poll_attempts: NonZeroU32::new(
                number("LEDGERLINK_ASSET_POLL_ATTEMPTS", DEFAULT_ASSET_POLL_ATTEMPTS)
                    .min(u64::from(u32::MAX)) as u32,
            )
            .unwrap_or(NonZeroU32::MIN),
        })
    }

    pub fn provider_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.base_url())
    }

    pub fn retry_budget(&self) -> RetryBudget {
        RetryBudget::new(self.asset_poll_delay, self.asset_poll_attempts)
    }

    pub fn link_request(&self, client_user_id: impl Into<String>) -> LinkTokenRequest {
        let mut request = LinkTokenRequest::new(client_user_id, self.client_name.clone());
        request.products = self.products.clone();
        request.country_codes = self.country_codes.clone();
        request.redirect_uri = self.redirect_uri.clone();
        request.android_package_name = self.android_package_name.clone();
        request
    }
}

fn read_u64(value: Option<String>, default: u64) -> u64 {
    value
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
