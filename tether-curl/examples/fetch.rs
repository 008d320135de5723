//! Fetch several URLs concurrently on one thread and print a line per result.
//!
//! Usage: cargo run -p tether-curl --example fetch -- [--verbose] URL...
//!
//! Set `RUST_LOG=tether=debug` to see engine activity.

use std::time::Instant;

use tether::{BodyCollector, ConfigBuilder, Engine, Reactor, TransferStatus, run_until_idle};
use tether_curl::CurlTransport;

fn main() -> Result<(), tether::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut verbose = false;
    let mut urls = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--verbose" | "-v" => verbose = true,
            _ => urls.push(arg),
        }
    }
    if urls.is_empty() {
        eprintln!("usage: fetch [--verbose] URL...");
        std::process::exit(2);
    }

    let config = ConfigBuilder::new()
        .verbose(verbose)
        .progress(verbose)
        .build()?;
    let mut reactor = Reactor::new()?;
    let mut engine: Engine<CurlTransport> = Engine::create(config)?;

    let started = Instant::now();
    let mut pending = Vec::new();
    for url in &urls {
        let (sink, body) = BodyCollector::new();
        match engine.submit(&mut reactor, url, sink) {
            Ok(_) => pending.push((url, body)),
            Err(e) => eprintln!("{url}: {e}"),
        }
    }

    run_until_idle(&mut reactor, &mut engine)?;

    for (url, body) in &pending {
        let len = body.body().map_or(0, |b| b.len());
        match body.status() {
            Some(TransferStatus::Completed { response_code }) => {
                let code = response_code.map_or("-".to_string(), |c| c.to_string());
                println!("{url}: {code} {len} bytes");
            }
            Some(TransferStatus::Failed(failure)) => println!("{url}: failed ({failure})"),
            None => println!("{url}: no result"),
        }
    }

    let stats = engine.stats();
    println!(
        "{} ok, {} failed in {:.2?}",
        stats.completed,
        stats.failed,
        started.elapsed()
    );
    engine.destroy(&mut reactor)
}
