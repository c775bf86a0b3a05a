//! Load shaping example: fire a burst of HTTP calls, lower the ceiling, fire
//! another burst and print the counters.
//!
//! Run with:
//!   cargo run --features cli -- serve 127.0.0.1:9191
//!
//! In another terminal:
//!   cargo run --example load-shape -- 127.0.0.1 9191

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use aggrmux::client::{AggregationClient, ClientConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let aggr_port: u16 = args.next().map(|p| p.parse()).transpose()?.unwrap_or(9191);

    let config = ClientConfig::new(host, 8080, aggr_port)
        .with_receive_timeout(Duration::from_secs(2))
        .with_sweep_interval(Duration::from_millis(500))
        .with_slots(1024);
    let client = AggregationClient::connect(config)?;

    burst(&client, "full ceiling", 5_000)?;

    let ceiling = client.decrease_load(50)?;
    eprintln!("ceiling lowered to {ceiling}");
    burst(&client, "half ceiling", 5_000)?;

    client.set_max_load();
    eprintln!("final stats: {:?}", client.stats());
    Ok(())
}

fn burst(
    client: &AggregationClient,
    label: &str,
    count: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let ok = Arc::new(AtomicU64::new(0));
    let failed = Arc::new(AtomicU64::new(0));
    let start = Instant::now();

    for i in 0..count {
        let ok = Arc::clone(&ok);
        let failed = Arc::clone(&failed);
        client.submit_http("GET", &format!("/echo/{i}"), "", &[], move |response| {
            if response.is_payload() {
                ok.fetch_add(1, Ordering::Relaxed);
            } else {
                failed.fetch_add(1, Ordering::Relaxed);
            }
        })?;
    }

    while ok.load(Ordering::Relaxed) + failed.load(Ordering::Relaxed) < count {
        std::thread::sleep(Duration::from_millis(10));
    }
    eprintln!(
        "[{label}] ok={} failed={} in {:?} (peak in-flight bounded by {})",
        ok.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
        client.current_load()
    );
    Ok(())
}
