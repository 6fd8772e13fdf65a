use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use aero_engine::shared::SharedSlot;
use serde::{Deserialize, Serialize};
use tokio::runtime::{Builder, Runtime};

use super::api::LeaderboardEntry;
use super::client::ScoreClient;
use crate::config::NetworkConfig;
use crate::state::Effect;

/// Outcome of a registration, tagged with the session generation that asked for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub generation: u64,
    pub player_id: Option<i64>,
}

/// Counts a background task as running until dropped.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn start(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Frame-side front of the scoring service.
///
/// `dispatch` never blocks: each effect becomes one detached task on an owned runtime.
/// Results come back only through two slots, which the frame loop reads when it likes.
pub struct ScoreSync {
    online: Option<(Runtime, ScoreClient)>,
    leaderboard: Arc<SharedSlot<Vec<LeaderboardEntry>>>,
    registrations: Arc<SharedSlot<Vec<Registration>>>,
    in_flight: Arc<AtomicUsize>,
}

impl std::fmt::Debug for ScoreSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoreSync")
            .field("base_url", &self.base_url())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl ScoreSync {
    /// Goes online when `network.api_url` is set and usable, offline otherwise.
    pub fn new(network: &NetworkConfig) -> io::Result<Self> {
        let Some(url) = network.api_url.as_deref() else {
            log::info!("no scoring service configured; playing offline");
            return Ok(Self::offline());
        };
        let client = match ScoreClient::new(url, network.timeout) {
            Ok(client) => client,
            Err(err) => {
                log::warn!("{err}; playing offline");
                return Ok(Self::offline());
            }
        };
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("score-sync")
            .enable_all()
            .build()?;
        log::info!("scoring service at {}", client.base_url());
        Ok(Self::with_parts(Some((runtime, client))))
    }

    /// Every operation fails locally: registrations resolve to `None` and nothing is sent.
    pub fn offline() -> Self {
        Self::with_parts(None)
    }

    fn with_parts(online: Option<(Runtime, ScoreClient)>) -> Self {
        Self {
            online,
            leaderboard: Arc::new(SharedSlot::new(Vec::new())),
            registrations: Arc::new(SharedSlot::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.is_some()
    }

    pub fn base_url(&self) -> Option<&str> {
        self.online.as_ref().map(|(_, client)| client.base_url())
    }

    pub fn dispatch(&self, effect: Effect) {
        let Some((runtime, client)) = &self.online else {
            if let Effect::RegisterPlayer { generation, .. } = effect {
                self.registrations.update(|queue| {
                    queue.push(Registration {
                        generation,
                        player_id: None,
                    })
                });
            }
            return;
        };

        let client = client.clone();
        let guard = InFlight::start(&self.in_flight);
        match effect {
            Effect::RegisterPlayer {
                generation,
                username,
            } => {
                let registrations = Arc::clone(&self.registrations);
                runtime.spawn(async move {
                    let player_id = client.register_player(&username).await;
                    registrations.update(|queue| {
                        queue.push(Registration {
                            generation,
                            player_id,
                        })
                    });
                    drop(guard);
                });
            }
            Effect::SubmitScore {
                player_id,
                score,
                duration,
            } => {
                runtime.spawn(async move {
                    client.submit_score(player_id, score, duration).await;
                    drop(guard);
                });
            }
            Effect::FetchLeaderboard { limit } => {
                let leaderboard = Arc::clone(&self.leaderboard);
                runtime.spawn(async move {
                    if let Some(entries) = client.fetch_leaderboard(limit).await {
                        log::debug!("leaderboard refreshed with {} rows", entries.len());
                        leaderboard.replace(entries);
                    }
                    drop(guard);
                });
            }
        }
    }

    /// Registration results that arrived since the last call, oldest first.
    pub fn take_registrations(&self) -> Vec<Registration> {
        self.registrations.take()
    }

    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.leaderboard.snapshot()
    }

    pub fn leaderboard_slot(&self) -> Arc<SharedSlot<Vec<LeaderboardEntry>>> {
        Arc::clone(&self.leaderboard)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Blocks until every dispatched task has finished or `max` has passed. Returns whether
    /// the queue drained. Meant for shutdown and headless runs, never the frame loop.
    pub fn wait_idle(&self, max: Duration) -> bool {
        let deadline = Instant::now() + max;
        while self.in_flight() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        true
    }
}

impl Drop for ScoreSync {
    fn drop(&mut self) {
        if let Some((runtime, _)) = self.online.take() {
            runtime.shutdown_background();
        }
    }
}
