//! Load test for the Celestial server.
//!
//! Spawns bot clients that:
//! - Connect over `/control` (bots refused with `full` are counted and stop)
//! - Push random held-direction intents over `/move` at frame rate
//! - Subscribe to `/snapshots`, counting ticks and tick regressions
//! - Disconnect cleanly at the end
//!
//! Usage: cargo run --bin loadtest -- [OPTIONS]
//!
//! Options:
//!   --clients N      Number of bots to spawn (default: 2)
//!   --duration S     Test duration in seconds (default: 10)
//!   --input-rate R   Intents per second per bot (default: 60)
//!   --seed N         Base seed for bot behaviour (default: 42)
//!   --url URL        Server base URL (default: ws://127.0.0.1:5555)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use celestial_shared::protocol::{
    Direction, LifecycleReply, LifecycleRequest, MovementIntent, ServerSnapshot,
};
use futures_util::{SinkExt, StreamExt};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio_tungstenite::{connect_async, tungstenite::Message};

// === Metrics ===

#[derive(Default)]
struct Metrics {
    accepted: AtomicU64,
    rejected: AtomicU64,
    snapshots_received: AtomicU64,
    tick_regressions: AtomicU64,
    intents_sent: AtomicU64,
    errors: AtomicU64,
    connect_latency_sum_ms: AtomicU64,
}

// === Bot task ===

async fn request(
    control: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    req: &LifecycleRequest,
) -> Option<LifecycleReply> {
    let json = serde_json::to_string(req).ok()?;
    control.send(Message::Text(json.into())).await.ok()?;
    while let Some(msg) = control.next().await {
        match msg {
            Ok(Message::Text(text)) => return serde_json::from_str(text.as_str()).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

async fn run_bot(
    bot: u32,
    url: String,
    input_rate: f64,
    duration: Duration,
    seed: u64,
    metrics: Arc<Metrics>,
) {
    let id = format!("bot-{}", bot);
    let connect_start = Instant::now();

    let (mut control, _) = match connect_async(format!("{}/control", url)).await {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("{} failed to connect: {}", id, e);
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    match request(&mut control, &LifecycleRequest::Connect { id: id.clone() }).await {
        Some(reply) if reply.is_ok() => {
            metrics.accepted.fetch_add(1, Ordering::Relaxed);
            metrics
                .connect_latency_sum_ms
                .fetch_add(connect_start.elapsed().as_millis() as u64, Ordering::Relaxed);
        }
        Some(_) => {
            metrics.rejected.fetch_add(1, Ordering::Relaxed);
            return;
        }
        None => {
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    }

    let (snapshots, moves) = tokio::join!(
        connect_async(format!("{}/snapshots", url)),
        connect_async(format!("{}/move", url)),
    );
    let (Ok((mut snapshots, _)), Ok((mut moves, _))) = (snapshots, moves) else {
        metrics.errors.fetch_add(1, Ordering::Relaxed);
        let _ = request(&mut control, &LifecycleRequest::Disconnect { id }).await;
        return;
    };

    let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(bot as u64));
    let mut held = Direction::ALL[rng.gen_range(0..4)];
    let mut input_timer = tokio::time::interval(Duration::from_secs_f64(1.0 / input_rate));
    input_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let test_end = tokio::time::Instant::now() + duration;
    let mut last_tick: Option<u64> = None;

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(test_end) => break,

            _ = input_timer.tick() => {
                // Change the held key roughly every half second at 60 Hz
                if rng.gen_bool(1.0 / 30.0) {
                    held = Direction::ALL[rng.gen_range(0..4)];
                }
                let intent = MovementIntent { id: id.clone(), direction: held };
                let Ok(json) = serde_json::to_string(&intent) else {
                    continue;
                };
                if moves.send(Message::Text(json.into())).await.is_err() {
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                metrics.intents_sent.fetch_add(1, Ordering::Relaxed);
            }

            msg = snapshots.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(snapshot) = serde_json::from_str::<ServerSnapshot>(text.as_str()) {
                            metrics.snapshots_received.fetch_add(1, Ordering::Relaxed);
                            if last_tick.is_some_and(|t| snapshot.tick <= t) {
                                metrics.tick_regressions.fetch_add(1, Ordering::Relaxed);
                            }
                            last_tick = Some(snapshot.tick);
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => {
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                }
            }
        }
    }

    if request(&mut control, &LifecycleRequest::Disconnect { id: id.clone() })
        .await
        .is_none()
    {
        metrics.errors.fetch_add(1, Ordering::Relaxed);
    }
    let _ = control.close(None).await;
    let _ = snapshots.close(None).await;
    let _ = moves.close(None).await;
}

// === Main ===

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut num_clients: u32 = 2;
    let mut duration_secs: u64 = 10;
    let mut input_rate: f64 = 60.0;
    let mut seed: u64 = 42;
    let mut url = "ws://127.0.0.1:5555".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--clients" => {
                i += 1;
                num_clients = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(2);
            }
            "--duration" => {
                i += 1;
                duration_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(10);
            }
            "--input-rate" => {
                i += 1;
                input_rate = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(60.0);
            }
            "--seed" => {
                i += 1;
                seed = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(42);
            }
            "--url" => {
                i += 1;
                url = args.get(i).cloned().unwrap_or(url);
            }
            _ => {}
        }
        i += 1;
    }
    if !(input_rate > 0.0) {
        input_rate = 60.0;
    }
    let url = url.trim_end_matches('/').to_string();

    println!("=== Celestial Server Load Test ===");
    println!("Bots: {}", num_clients);
    println!("Duration: {}s", duration_secs);
    println!("Input rate: {}/s per bot", input_rate);
    println!("URL: {}", url);
    println!();

    let metrics = Arc::new(Metrics::default());
    let duration = Duration::from_secs(duration_secs);

    let handles: Vec<_> = (0..num_clients)
        .map(|bot| {
            let url = url.clone();
            let metrics = Arc::clone(&metrics);
            tokio::spawn(run_bot(bot, url, input_rate, duration, seed, metrics))
        })
        .collect();

    for handle in handles {
        let _ = handle.await;
    }

    let accepted = metrics.accepted.load(Ordering::Relaxed);
    let snapshots = metrics.snapshots_received.load(Ordering::Relaxed);

    println!("=== Final Results ===");
    println!("Accepted: {}", accepted);
    println!("Rejected (full): {}", metrics.rejected.load(Ordering::Relaxed));
    println!("Intents sent: {}", metrics.intents_sent.load(Ordering::Relaxed));
    println!("Snapshots received: {}", snapshots);
    println!("Tick regressions: {}", metrics.tick_regressions.load(Ordering::Relaxed));
    println!("Errors: {}", metrics.errors.load(Ordering::Relaxed));
    if accepted > 0 {
        println!(
            "Average connect latency: {}ms",
            metrics.connect_latency_sum_ms.load(Ordering::Relaxed) / accepted
        );
        println!(
            "Snapshots per bot per second: {:.1} (50 expected at the default tick)",
            snapshots as f64 / accepted as f64 / duration_secs.max(1) as f64
        );
    }
}
