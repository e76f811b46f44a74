//! Per-operation context: the store, the gateway, budgets and the clock.

use chrono::{Local, NaiveDateTime};

use crate::config::{Config, ConversationConfig, ScanConfig};
use crate::error::CallError;
use crate::format::FormatOptions;
use crate::gateway::Gateway;
use crate::store::{MailStore, StoreResult};

/// Everything a core operation needs to talk to one mailbox.
///
/// Cheap to build; create one per top-level operation. The clock can be
/// pinned with [`Session::at`] so time windows are reproducible.
pub struct Session<'s> {
    store: &'s dyn MailStore,
    gateway: Gateway,
    scan: ScanConfig,
    conversation: ConversationConfig,
    now: Option<NaiveDateTime>,
}

impl<'s> Session<'s> {
    /// Session with default budgets and retry policy.
    pub fn new(store: &'s dyn MailStore) -> Self {
        Self {
            store,
            gateway: Gateway::default(),
            scan: ScanConfig::default(),
            conversation: ConversationConfig::default(),
            now: None,
        }
    }

    /// Session using the budgets and retry policy of `config`.
    pub fn from_config(store: &'s dyn MailStore, config: &Config) -> Self {
        Self {
            store,
            gateway: Gateway::from_config(&config.gateway),
            scan: config.scan.clone(),
            conversation: config.conversation.clone(),
            now: None,
        }
    }

    pub fn with_gateway(mut self, gateway: Gateway) -> Self {
        self.gateway = gateway;
        self
    }

    /// Pin "now" for time-window computations.
    pub fn at(mut self, now: NaiveDateTime) -> Self {
        self.now = Some(now);
        self
    }

    pub fn store(&self) -> &'s dyn MailStore {
        self.store
    }

    pub fn scan(&self) -> &ScanConfig {
        &self.scan
    }

    pub fn conversation(&self) -> &ConversationConfig {
        &self.conversation
    }

    /// Naive local "now", or the pinned instant.
    pub fn now(&self) -> NaiveDateTime {
        self.now.unwrap_or_else(|| Local::now().naive_local())
    }

    pub fn format_options(&self) -> FormatOptions {
        FormatOptions::from(&self.scan)
    }

    /// Run a store call through the gateway.
    pub fn call<T, F>(&self, description: &str, mut action: F) -> Result<T, CallError>
    where
        F: FnMut(&'s dyn MailStore) -> StoreResult<T>,
    {
        let store = self.store;
        self.gateway.execute(description, || action(store))
    }
}
