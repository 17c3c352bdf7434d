use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use based_client::{Client, ClientConfig, LoopbackTransport};
use clap::Parser;
use serde_json::{Value, json};

/// Exercise the based client against an in-process loopback backend
#[derive(Parser)]
#[command(name = "based-demo")]
#[command(version)]
#[command(about = "Exercise the based client against an in-process loopback backend")]
struct Cli {
    /// Configuration file (TOML); BASED_* environment variables override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of concurrent `get("counter")` calls
    #[arg(long, default_value_t = 100)]
    gets: usize,

    /// Cancel the `counter` subscription after this many updates
    #[arg(long, default_value_t = 3)]
    updates: usize,

    /// Interval between observable ticks, in milliseconds
    #[arg(long, default_value_t = 200)]
    tick_ms: u64,
}

fn loopback(tick: Duration) -> LoopbackTransport {
    let transport = LoopbackTransport::new(tick);
    let reads = Arc::new(AtomicU64::new(0));
    transport.register_function("counter", move |_| {
        let count = reads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!({ "count": count }).to_string())
    });
    transport.register_observable("counter", |_, tick| Ok(json!({ "count": tick }).to_string()));
    transport.register_function("crasher", |_| {
        Err(json!({"code": 500, "message": "crasher always fails"}).to_string())
    });
    transport
}

/// Issue `count` `get("counter")` calls at once and wait for all of them.
///
/// Returns how many succeeded.
async fn concurrent_gets(client: &Client<LoopbackTransport>, count: usize) -> usize {
    let calls: Vec<_> = (0..count)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.get::<Value>("counter", &json!({})).await })
        })
        .collect();

    let mut ok = 0;
    for call in calls {
        match call.await {
            Ok(Ok(_)) => ok += 1,
            Ok(Err(e)) => eprintln!("get failed: {}", e),
            Err(e) => eprintln!("get task panicked: {}", e),
        }
    }
    ok
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let config = match ClientConfig::from_sources(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("{}; falling back to demo configuration", e);
            ClientConfig::new("demo", "demo", "local")
        }
    };
    let client = Client::with_transport(config, loopback(Duration::from_millis(cli.tick_ms)));

    let ok = concurrent_gets(&client, cli.gets).await;
    eprintln!(
        "{}/{} gets succeeded, {} still pending",
        ok,
        cli.gets,
        client.pending_calls()
    );

    if let Err(e) = client.function::<Value>("crasher", &json!({})).await {
        eprintln!("crasher: {}", e);
    }

    let mut counter = match client.observe::<Value>("counter", &json!({})) {
        Ok(subscription) => subscription,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let mut seen = 0;
    while let Some(update) = counter.next_update().await {
        match update {
            Ok(value) => {
                seen += 1;
                eprintln!("update {} (checksum {:?}): {}", seen, counter.checksum(), value);
            }
            Err(e) => eprintln!("update error: {}", e),
        }
        if seen >= cli.updates {
            counter.cancel();
        }
    }
    eprintln!(
        "subscription ended after {} updates, {} unobserve calls",
        seen,
        client.transport().unobserve_calls()
    );

    client.close();
}
