//! Exchange Web Services client over blocking HTTP.
//!
//! Every call blocks; async callers run these on dedicated threads.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tracing::instrument;

use crate::account::{AccountFactory, CalendarAccount};
use crate::error::EwsError;
use crate::retry::{with_retry, RetryConfig};
use crate::soap;
use crate::types::{CalendarItem, SendMeetingInvitations};

/// Upper bound on item ids per GetItem request.
const GET_ITEM_BATCH: usize = 100;

#[derive(Clone)]
pub enum Credentials {
    Basic { username: String, password: String },
    Bearer(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Credentials::Bearer(_) => f.debug_tuple("Bearer").field(&"***").finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EwsConfiguration {
    pub server_url: String,
    pub credentials: Credentials,
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl EwsConfiguration {
    pub fn new(server_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            server_url: server_url.into(),
            credentials,
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }
}

/// How an [`EwsAccount`] reaches its mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    /// The credentials own the mailbox (or have delegate rights on it).
    Delegate,
    /// Requests carry an `ExchangeImpersonation` header for the mailbox.
    Impersonation,
}

pub struct EwsClient {
    http: reqwest::blocking::Client,
    config: EwsConfiguration,
}

impl EwsClient {
    pub fn new(config: EwsConfiguration) -> Result<Self, EwsError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn server_url(&self) -> &str {
        &self.config.server_url
    }

    /// Account for `email` sharing this client's connection pool.
    pub fn account(self: &Arc<Self>, email: &str, access: AccessType) -> EwsAccount {
        EwsAccount {
            client: Arc::clone(self),
            primary_smtp_address: email.to_string(),
            access,
        }
    }

    /// Send a read-only SOAP operation, retrying throttled and transient
    /// failures.
    fn post(&self, impersonate: Option<&str>, body: &str) -> Result<String, EwsError> {
        let envelope = soap::envelope(impersonate, body);
        with_retry(&self.config.retry, || self.send_once(&envelope))
    }

    /// Send a SOAP operation exactly once. CreateItem and DeleteItem may
    /// have taken effect even when the response is lost, so they are never
    /// repeated.
    fn post_once(&self, impersonate: Option<&str>, body: &str) -> Result<String, EwsError> {
        self.send_once(&soap::envelope(impersonate, body))
    }

    fn send_once(&self, envelope: &str) -> Result<String, EwsError> {
        let request = self
            .http
            .post(&self.config.server_url)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .body(envelope.to_string());
        let request = match &self.config.credentials {
            Credentials::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            Credentials::Bearer(token) => request.bearer_auth(token),
        };

        let response = request.send()?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(EwsError::Unauthorized);
        }

        // EWS reports throttling and most failures as a SOAP fault with a 500.
        let status_error = response.error_for_status_ref().err();
        if let Some(err) = status_error {
            let text = response.text().unwrap_or_default();
            return Err(soap::fault_error(&text).unwrap_or(EwsError::Http(err)));
        }

        Ok(response.text()?)
    }
}

/// A mailbox reached through [`EwsClient`].
pub struct EwsAccount {
    client: Arc<EwsClient>,
    primary_smtp_address: String,
    access: AccessType,
}

impl EwsAccount {
    fn impersonation(&self) -> Option<&str> {
        match self.access {
            AccessType::Impersonation => Some(&self.primary_smtp_address),
            AccessType::Delegate => None,
        }
    }
}

impl CalendarAccount for EwsAccount {
    fn primary_smtp_address(&self) -> &str {
        &self.primary_smtp_address
    }

    #[instrument(skip(self), fields(mailbox = %self.primary_smtp_address), level = "debug")]
    fn view(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<CalendarItem>, EwsError> {
        let find = soap::find_item_request(&self.primary_smtp_address, start, end);
        let ids = soap::parse_find_item_response(&self.client.post(self.impersonation(), &find)?)?;

        let mut items = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(GET_ITEM_BATCH) {
            let chunk: Vec<&str> = chunk.iter().map(|(id, _)| id.as_str()).collect();
            let xml = self
                .client
                .post(self.impersonation(), &soap::get_item_request(&chunk))?;
            items.extend(soap::parse_items_response(&xml, true)?);
        }
        tracing::debug!("Fetched {} items", items.len());
        Ok(items)
    }

    #[instrument(skip(self), fields(mailbox = %self.primary_smtp_address), level = "debug")]
    fn get(&self, id: &str) -> Result<CalendarItem, EwsError> {
        let xml = self
            .client
            .post(self.impersonation(), &soap::get_item_request(&[id]))?;
        soap::parse_items_response(&xml, false)?
            .into_iter()
            .next()
            .ok_or_else(|| EwsError::ItemNotFound(id.to_string()))
    }

    #[instrument(skip(self, item), fields(mailbox = %self.primary_smtp_address), level = "debug")]
    fn save(
        &self,
        item: &CalendarItem,
        send: SendMeetingInvitations,
    ) -> Result<CalendarItem, EwsError> {
        let xml = self
            .client
            .post_once(self.impersonation(), &soap::create_item_request(item, send))?;
        let created = soap::parse_items_response(&xml, false)?.into_iter().next();

        let mut saved = item.clone();
        saved.id = created.as_ref().and_then(|c| c.id.clone());
        saved.change_key = created.and_then(|c| c.change_key);
        Ok(saved)
    }

    #[instrument(skip(self, item), fields(mailbox = %self.primary_smtp_address, id = ?item.id), level = "debug")]
    fn delete(&self, item: &CalendarItem) -> Result<(), EwsError> {
        let id = item.id.as_deref().ok_or(EwsError::MissingItemId)?;
        let xml = self.client.post_once(
            self.impersonation(),
            &soap::delete_item_request(id, item.change_key.as_deref()),
        )?;
        soap::parse_delete_response(&xml)
    }
}

/// Opens impersonated accounts on a shared [`EwsClient`].
pub struct EwsAccountFactory {
    client: Arc<EwsClient>,
}

impl EwsAccountFactory {
    pub fn new(client: Arc<EwsClient>) -> Self {
        Self { client }
    }
}

impl AccountFactory for EwsAccountFactory {
    fn impersonate(&self, email: &str) -> Result<Arc<dyn CalendarAccount>, EwsError> {
        Ok(Arc::new(self.client.account(email, AccessType::Impersonation)))
    }
}
