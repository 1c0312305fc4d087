//! Test doubles and common utilities for collector contract tests
//!
//! This module provides minimal parser and storer doubles that record how the
//! collector calls them, plus helpers for driving a receiver over loopback UDP.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use syslog_core::config::{CollectorConfig, HandlerConfig, ListenerConfig};
use syslog_core::error::{Error, Result};
use syslog_core::traits::{
    ParsedRecord, Parser, ParserFactory, Storer, StorerFactory, StorerSettings,
};
use syslog_core::{DecodedMessage, ModuleRegistry};
use tokio::net::UdpSocket;

/// Registered name of [`FieldParser`]
pub const FIELD_PARSER: &str = "fields";

/// Registered name of [`RecordingStorer`]
pub const RECORDING_STORER: &str = "recording";

/// Registered name of the storer built by [`FlakyStorerFactory`]
pub const FLAKY_STORER: &str = "flaky";

/// Parser producing `[hostname, text]`
///
/// Messages whose text starts with `ignore` are not understood (`Ok(None)`);
/// text starting with `malformed` is a parse error.
#[derive(Clone, Default)]
pub struct FieldParser {
    calls: Arc<AtomicUsize>,
}

impl FieldParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of times parse() was called
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Parser for FieldParser {
    fn parse(&self, message: &DecodedMessage) -> Result<Option<ParsedRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if message.text().starts_with("ignore") {
            return Ok(None);
        }
        if message.text().starts_with("malformed") {
            return Err(Error::parse(FIELD_PARSER, "no fields"));
        }
        Ok(Some(vec![
            message.hostname().to_string(),
            message.text().to_string(),
        ]))
    }

    fn module_name(&self) -> &'static str {
        FIELD_PARSER
    }
}

impl ParserFactory for FieldParser {
    fn create(&self) -> Result<Box<dyn Parser>> {
        Ok(Box::new(self.clone()))
    }
}

/// What a [`RecordingStorer`] answers to store_messages()
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Accept,
    Refuse,
    Fail,
}

/// A storer that records every batch it is handed
#[derive(Clone)]
pub struct RecordingStorer {
    outcome: Arc<Mutex<StoreOutcome>>,
    batches: Arc<Mutex<Vec<Vec<ParsedRecord>>>>,
    calls: Arc<AtomicUsize>,
}

impl RecordingStorer {
    pub fn new(outcome: StoreOutcome) -> Self {
        Self {
            outcome: Arc::new(Mutex::new(outcome)),
            batches: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Change the answer for later calls
    pub fn set_outcome(&self, outcome: StoreOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    /// Get the number of times store_messages() was called
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every batch handed over, including refused ones
    pub fn batches(&self) -> Vec<Vec<ParsedRecord>> {
        self.batches.lock().unwrap().clone()
    }

    /// Shared handle, for registering or enqueueing directly
    pub fn as_storer(&self) -> Arc<dyn Storer> {
        Arc::new(self.clone())
    }
}

#[async_trait::async_trait]
impl Storer for RecordingStorer {
    async fn store_messages(&self, batch: &[ParsedRecord]) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batches.lock().unwrap().push(batch.to_vec());

        let outcome = *self.outcome.lock().unwrap();
        match outcome {
            StoreOutcome::Accept => Ok(true),
            StoreOutcome::Refuse => Ok(false),
            StoreOutcome::Fail => Err(Error::store(RECORDING_STORER, "backend unavailable")),
        }
    }

    fn module_name(&self) -> &'static str {
        RECORDING_STORER
    }
}

impl StorerFactory for RecordingStorer {
    fn create(&self, _settings: &StorerSettings) -> Result<Box<dyn Storer>> {
        Ok(Box::new(self.clone()))
    }
}

/// Factory that fails its first `failures` constructions
pub struct FlakyStorerFactory {
    failures: usize,
    attempts: Arc<AtomicUsize>,
    storer: RecordingStorer,
}

impl FlakyStorerFactory {
    pub fn new(failures: usize, storer: RecordingStorer) -> (Self, Arc<AtomicUsize>) {
        let attempts = Arc::new(AtomicUsize::new(0));
        let factory = Self {
            failures,
            attempts: Arc::clone(&attempts),
            storer,
        };
        (factory, attempts)
    }
}

impl StorerFactory for FlakyStorerFactory {
    fn create(&self, _settings: &StorerSettings) -> Result<Box<dyn Storer>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(Error::construction(FLAKY_STORER, "backend not reachable yet"));
        }
        Ok(Box::new(self.storer.clone()))
    }
}

/// Registry with [`FieldParser`] and [`RecordingStorer`] registered
pub fn test_registry(parser: &FieldParser, storer: &RecordingStorer) -> Arc<ModuleRegistry> {
    let registry = ModuleRegistry::new();
    registry.register_parser(FIELD_PARSER, Box::new(parser.clone()));
    registry.register_storer(RECORDING_STORER, Box::new(storer.clone()));
    Arc::new(registry)
}

/// Loopback listener on an ephemeral port
///
/// The flush interval is long enough that only explicit flushes (or stop)
/// reach the storer during a test.
pub fn loopback_config(handlers: Vec<HandlerConfig>) -> CollectorConfig {
    CollectorConfig {
        listener: ListenerConfig::new("127.0.0.1", 0).with_flush_interval_secs(3600),
        handlers,
    }
}

/// Handler for loopback senders using the test parser and storer
pub fn loopback_handler(id: &str) -> HandlerConfig {
    HandlerConfig::new(id)
        .with_parser(FIELD_PARSER)
        .with_storer(RECORDING_STORER)
        .with_filter_addresses(["127.0.0.1"])
}

/// Send one datagram from a fresh loopback socket
pub async fn send_datagram(to: SocketAddr, payload: &[u8]) {
    let socket = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("bind client socket");
    socket.send_to(payload, to).await.expect("send datagram");
}

/// Poll `check` until it holds, for up to two seconds
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
