use std::time::{Duration, Instant};

use celestial_client::config::ClientConfig;
use celestial_client::patrol::Patrol;
use celestial_client::reconcile::ReconciliationEngine;
use celestial_client::session::{SessionClient, SessionStatus};
use tracing_subscriber::EnvFilter;

const FRAME_DT: Duration = Duration::from_micros(16_667);
const LOG_EVERY: Duration = Duration::from_secs(1);

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let session = match SessionClient::connect(&config) {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let mut engine = ReconciliationEngine::new();
    let mut patrol = Patrol::square(1.5);
    let started = Instant::now();
    let run_for = Duration::from_secs_f64(config.run_secs);
    let mut last_frame = Instant::now();
    let mut last_log = Instant::now();
    let mut rejected = false;

    while started.elapsed() < run_for {
        let now = Instant::now();
        let dt = now.duration_since(last_frame).as_secs_f64();
        last_frame = now;

        match session.status() {
            SessionStatus::Pending => {}
            SessionStatus::Rejected => {
                tracing::error!("Server rejected {}", session.player_id());
                rejected = true;
                break;
            }
            SessionStatus::Accepted => {
                if let Some(direction) = patrol.update(dt) {
                    session.send_move(direction);
                }
            }
        }

        let snapshot = session.poll_snapshot();
        engine.frame(snapshot.as_ref(), dt);

        if last_log.elapsed() >= LOG_EVERY {
            last_log = Instant::now();
            if engine.is_empty() {
                tracing::info!("No participants yet");
            } else if !engine.match_started() {
                tracing::info!("Waiting for the match to start");
            }
            let mut states: Vec<_> = engine.render_states().collect();
            states.sort_by(|a, b| a.0.cmp(b.0));
            for (id, state) in states {
                let marker = if id == session.player_id() { "*" } else { " " };
                tracing::info!(
                    "[{}]{}{} at ({:.1}, {:.1}) {:?} {:?} frame {}",
                    engine.match_clock(),
                    marker,
                    id,
                    state.position.x,
                    state.position.y,
                    state.motion,
                    state.facing,
                    state.frame
                );
            }
        }

        if let Some(rest) = FRAME_DT.checked_sub(now.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    if let Err(e) = session.shutdown() {
        tracing::warn!("{}", e);
    }
    if rejected {
        std::process::exit(1);
    }
}
