//! Minimal embedding example for syslog-core
//!
//! This example demonstrates using syslog-core as a library in a custom application.
//! The receiver lifecycle is fully managed by the application: it registers its own
//! parser, keeps batches in memory, watches the live feed and sends itself a few
//! messages over loopback UDP.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use syslog_core::config::{CollectorConfig, HandlerConfig, ListenerConfig};
use syslog_core::store::{MEMORY_STORER, MemoryStorerFactory};
use syslog_core::traits::{ParsedRecord, Parser, ParserFactory};
use syslog_core::{DecodedMessage, ModuleRegistry, Receiver, Result};
use tokio::net::UdpSocket;
use tokio_stream::StreamExt;

/// Custom parser for embedded usage: `[severity, hostname, text]`
#[derive(Clone, Default)]
struct EmbeddedParser {
    parse_calls: Arc<AtomicUsize>,
}

impl EmbeddedParser {
    fn parse_count(&self) -> usize {
        self.parse_calls.load(Ordering::SeqCst)
    }
}

impl Parser for EmbeddedParser {
    fn parse(&self, message: &DecodedMessage) -> Result<Option<ParsedRecord>> {
        self.parse_calls.fetch_add(1, Ordering::SeqCst);

        let severity = message
            .severity()
            .map(|s| format!("{:?}", s).to_lowercase())
            .unwrap_or_else(|| "none".to_string());

        Ok(Some(vec![
            severity,
            message.hostname().to_string(),
            message.text().to_string(),
        ]))
    }

    fn module_name(&self) -> &'static str {
        "embedded"
    }
}

impl ParserFactory for EmbeddedParser {
    fn create(&self) -> Result<Box<dyn Parser>> {
        Ok(Box::new(self.clone()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    println!("=== Embedded syslog-core Example ===\n");

    // Register custom and built-in modules
    let parser = EmbeddedParser::default();
    let storage = MemoryStorerFactory::default();

    let registry = ModuleRegistry::new();
    registry.register_parser("embedded", Box::new(parser.clone()));
    registry.register_storer(MEMORY_STORER, Box::new(storage.clone()));
    syslog_module_generic::register(&registry);

    // Route loopback senders through the custom parser into memory
    let config = CollectorConfig {
        listener: ListenerConfig::new("127.0.0.1", 0).with_flush_interval_secs(1),
        handlers: vec![
            HandlerConfig::new("loopback")
                .with_parser("embedded")
                .with_storer(MEMORY_STORER)
                .with_filter_addresses(["127.0.0.1"]),
        ],
    };

    println!("1. Starting receiver...");
    let mut receiver = Receiver::new(config, Arc::new(registry));

    let mut feed = receiver.bus().subscribe().into_stream();
    let monitor = tokio::spawn(async move {
        println!("2. Monitor started");
        while let Some(message) = feed.next().await {
            println!("[Monitor] {} {:?}: {}", message.hostname(), message.severity(), message.text());
        }
        println!("Monitor stopped");
    });

    receiver.start().await?;
    let addr = receiver
        .local_addr()
        .ok_or_else(|| syslog_core::Error::Other("receiver has no address".to_string()))?;
    println!("3. Listening on {}", addr);

    // Send a few messages to ourselves
    let client = UdpSocket::bind("127.0.0.1:0").await?;
    for payload in [
        "<34>Oct 11 22:14:15 mymachine su: 'su root' failed for lonvick on /dev/pts/8",
        "<13>Feb  5 01:02:03 edge link down",
        "<14>no header at all",
    ] {
        client.send_to(payload.as_bytes(), addr).await?;
    }

    // Let one flush cycle run
    tokio::time::sleep(tokio::time::Duration::from_millis(1500)).await;

    println!("\n4. Stopping receiver...");
    let report = receiver.stop().await;
    let _ = tokio::time::timeout(tokio::time::Duration::from_millis(100), monitor).await;

    println!("\n5. Stored records ({} parsed):", parser.parse_count());
    for record in storage.storer().records().await {
        println!("   {:?}", record);
    }
    println!("   final flush: {:?}", report);

    println!("\n=== Embedding Successful ===");
    println!("Key Points:");
    println!("- Receiver lifecycle is fully controlled by application");
    println!("- No global state");
    println!("- Modules are registered by the application, not the daemon");

    Ok(())
}
