//! demos/load_client.rs
//! Run: cargo run --example load_client -- [target] [clients] [seconds]
//!
//! Each client keeps one connection open, writes a small payload and waits
//! for the echo. Once a second the request count and p50/p99 latency are
//! printed.

use anyhow::Result;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, Instant};

const PAYLOAD: &[u8] = b"Hello Gorgon!";

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let target = args.next().unwrap_or_else(|| "127.0.0.1:8080".to_string());
    let clients: usize = args.next().and_then(|v| v.parse().ok()).unwrap_or(50);
    let seconds: u64 = args.next().and_then(|v| v.parse().ok()).unwrap_or(300);

    println!("Starting latency & load test against {target} ({clients} clients, {seconds}s)");

    let deadline = Instant::now() + Duration::from_secs(seconds);
    let (latency_tx, mut latency_rx) = mpsc::channel::<Duration>(100_000);

    let workers: Vec<_> = (0..clients)
        .map(|id| {
            let target = target.clone();
            let latency_tx = latency_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = run_client(&target, deadline, latency_tx).await {
                    eprintln!("client {id}: {e}");
                }
            })
        })
        .collect();
    drop(latency_tx);

    let reporter = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(1));
        let mut samples: Vec<Duration> = Vec::with_capacity(80_000);
        loop {
            tokio::select! {
                sample = latency_rx.recv() => match sample {
                    Some(d) => samples.push(d),
                    None => break,
                },
                _ = ticker.tick() => {
                    if let Some((p50, p99)) = percentiles(&mut samples) {
                        println!("QPS: {} | P50: {:?} | P99: {:?}", samples.len(), p50, p99);
                    }
                    samples.clear();
                }
            }
        }
    });

    futures::future::join_all(workers).await;
    reporter.await?;
    println!("Load test finished.");
    Ok(())
}

async fn run_client(target: &str, deadline: Instant, latencies: mpsc::Sender<Duration>) -> Result<()> {
    let mut conn = timeout(Duration::from_secs(5), TcpStream::connect(target)).await??;
    let mut read_buf = [0u8; 1024];

    while Instant::now() < deadline {
        let started = Instant::now();
        conn.write_all(PAYLOAD).await?;
        if conn.read(&mut read_buf).await? == 0 {
            anyhow::bail!("connection closed by proxy");
        }
        // Drop samples rather than stall the client when the reporter lags.
        let _ = latencies.try_send(started.elapsed());
    }
    Ok(())
}

fn percentiles(samples: &mut [Duration]) -> Option<(Duration, Duration)> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_unstable();
    let at = |q: f64| samples[((samples.len() as f64 * q) as usize).min(samples.len() - 1)];
    Some((at(0.50), at(0.99)))
}
