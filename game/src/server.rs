//! In-memory scoring service speaking the same JSON as the remote one.
//!
//! Used by `aerogesture serve` for offline play and by the tests as a real endpoint.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};
use std::{fmt, io};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};

use crate::sync::api::{
    ErrorResponse, GameRecord, GlobalStats, GlobalStatsResponse, LeaderboardResponse,
    LeaderboardRow, PlayerRecord, PlayerStats, PlayerStatsResponse, RegisterRequest,
    RegisterResponse, SubmitScoreRequest, SubmitScoreResponse, TopPlayer,
};

pub const DEFAULT_PORT: u16 = 5000;
pub const SERVER_ADDR_ENV: &str = "AEROGESTURE_SERVER_ADDR";
pub const SERVER_PORT_ENV: &str = "AEROGESTURE_SERVER_PORT";

const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
const RECENT_GAMES: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    UsernameRequired,
    MissingFields,
    UnknownPlayer(i64),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::UsernameRequired => write!(f, "Username is required"),
            StoreError::MissingFields => write!(f, "player_id and score are required"),
            StoreError::UnknownPlayer(id) => write!(f, "Player {id} not found"),
        }
    }
}

impl std::error::Error for StoreError {}

#[derive(Debug, Clone)]
struct SessionRecord {
    player_id: i64,
    score: u32,
    duration: f64,
    pipes_passed: u32,
    created_at: u64,
}

/// Players and finished sessions. Ids start at 1 and are never reused.
#[derive(Debug, Default)]
pub struct ScoreStore {
    players: Vec<PlayerRecord>,
    sessions: Vec<SessionRecord>,
}

const SECS_PER_DAY: u64 = 86_400;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Formats Unix seconds the way SQLite's `CURRENT_TIMESTAMP` does (UTC).
fn sqlite_timestamp(secs: u64) -> String {
    let days = (secs / SECS_PER_DAY) as i64;
    let rem = secs % SECS_PER_DAY;

    // Civil date from days since 1970-01-01 (proleptic Gregorian).
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);

    format!(
        "{year:04}-{month:02}-{day:02} {:02}:{:02}:{:02}",
        rem / 3_600,
        rem % 3_600 / 60,
        rem % 60
    )
}

/// Which finished games a leaderboard counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Period {
    #[default]
    All,
    /// Games from the current UTC day.
    Today,
    /// Games from the last seven UTC days, today included.
    Week,
}

impl Period {
    /// Unknown names count every game.
    pub fn parse(name: &str) -> Self {
        match name {
            "today" => Period::Today,
            "week" => Period::Week,
            _ => Period::All,
        }
    }

    fn includes(self, created_at: u64, now: u64) -> bool {
        let (day, today) = (created_at / SECS_PER_DAY, now / SECS_PER_DAY);
        match self {
            Period::All => true,
            Period::Today => day == today,
            Period::Week => day + 7 >= today,
        }
    }
}

impl ScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the player's id and whether the player is new. Names are trimmed; an
    /// existing name gets its existing id back.
    pub fn register(&mut self, username: &str) -> Result<(i64, bool), StoreError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(StoreError::UsernameRequired);
        }
        if let Some(existing) = self.players.iter().find(|p| p.username == username) {
            return Ok((existing.id, false));
        }
        let id = self.players.len() as i64 + 1;
        self.players.push(PlayerRecord {
            id,
            username: username.to_string(),
            created_at: sqlite_timestamp(now_secs()),
        });
        Ok((id, true))
    }

    pub fn submit(&mut self, req: &SubmitScoreRequest) -> Result<u32, StoreError> {
        let (Some(player_id), Some(score)) = (req.player_id, req.score) else {
            return Err(StoreError::MissingFields);
        };
        if self.player(player_id).is_none() {
            return Err(StoreError::UnknownPlayer(player_id));
        }
        self.sessions.push(SessionRecord {
            player_id,
            score,
            duration: req.duration.max(0.0),
            pipes_passed: req.pipes_passed.unwrap_or(score),
            created_at: now_secs(),
        });
        Ok(score)
    }

    pub fn player(&self, id: i64) -> Option<&PlayerRecord> {
        self.players.iter().find(|p| p.id == id)
    }

    fn sessions_of(&self, id: i64) -> impl Iterator<Item = &SessionRecord> {
        self.sessions.iter().filter(move |s| s.player_id == id)
    }

    /// Best score first; players who never finished a game come last. Ties keep
    /// registration order. Outside [`Period::All`] only players with a game in the
    /// period are listed.
    pub fn leaderboard(&self, limit: usize, period: Period) -> Vec<LeaderboardRow> {
        self.leaderboard_at(limit, period, now_secs())
    }

    fn leaderboard_at(&self, limit: usize, period: Period, now: u64) -> Vec<LeaderboardRow> {
        let mut rows: Vec<LeaderboardRow> = self
            .players
            .iter()
            .filter_map(|p| {
                let scores: Vec<u32> = self
                    .sessions_of(p.id)
                    .filter(|s| period.includes(s.created_at, now))
                    .map(|s| s.score)
                    .collect();
                if scores.is_empty() && period != Period::All {
                    return None;
                }
                Some(LeaderboardRow {
                    username: p.username.clone(),
                    best_score: scores.iter().copied().max(),
                    games_played: scores.len() as u32,
                    avg_score: mean(scores.iter().map(|&s| f64::from(s))),
                    joined_date: Some(p.created_at.clone()),
                })
            })
            .collect();
        rows.sort_by(|a, b| b.best_score.cmp(&a.best_score));
        rows.truncate(limit);
        rows
    }

    pub fn player_stats(&self, id: i64) -> Option<PlayerStatsResponse> {
        let player = self.player(id)?.clone();
        let sessions: Vec<&SessionRecord> = self.sessions_of(id).collect();

        let stats = PlayerStats {
            total_games: sessions.len() as u32,
            best_score: sessions.iter().map(|s| s.score).max(),
            avg_score: mean(sessions.iter().map(|s| f64::from(s.score))),
            total_score: (!sessions.is_empty())
                .then(|| sessions.iter().map(|s| u64::from(s.score)).sum()),
            avg_duration: mean(sessions.iter().map(|s| s.duration)),
        };
        let recent_games = sessions
            .iter()
            .rev()
            .take(RECENT_GAMES)
            .map(|s| GameRecord {
                score: s.score,
                duration: s.duration,
                pipes_passed: s.pipes_passed,
                created_at: sqlite_timestamp(s.created_at),
            })
            .collect();

        Some(PlayerStatsResponse {
            success: true,
            player,
            stats,
            recent_games,
        })
    }

    pub fn global_stats(&self) -> GlobalStats {
        let mut players: Vec<i64> = self.sessions.iter().map(|s| s.player_id).collect();
        players.sort_unstable();
        players.dedup();

        let top_player = self
            .sessions
            .iter()
            .fold(None::<&SessionRecord>, |best, s| match best {
                Some(b) if b.score >= s.score => Some(b),
                _ => Some(s),
            })
            .and_then(|s| {
                self.player(s.player_id).map(|p| TopPlayer {
                    username: p.username.clone(),
                    score: s.score,
                })
            });

        GlobalStats {
            total_players: players.len() as u32,
            total_games: self.sessions.len() as u32,
            highest_score: self.sessions.iter().map(|s| s.score).max(),
            avg_score: mean(self.sessions.iter().map(|s| f64::from(s.score))),
            total_playtime: (!self.sessions.is_empty())
                .then(|| self.sessions.iter().map(|s| s.duration).sum()),
            top_player,
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0u32), |(sum, n), v| (sum + v, n + 1));
    (count > 0).then(|| sum / f64::from(count))
}

#[derive(Debug, Clone, Default)]
pub struct ServerState {
    store: Arc<Mutex<ScoreStore>>,
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self) -> MutexGuard<'_, ScoreStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, err: impl fmt::Display) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

async fn health() -> &'static str {
    "ok"
}

async fn register_player(
    State(state): State<ServerState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let result = state.store().register(&payload.username);
    match result {
        Ok((player_id, created)) => {
            let message = if created {
                "Player registered successfully"
            } else {
                "Player already exists"
            };
            log::info!("register {:?} -> {player_id}", payload.username.trim());
            Ok(Json(RegisterResponse {
                success: true,
                player_id,
                username: payload.username.trim().to_string(),
                message: message.to_string(),
            }))
        }
        Err(err) => Err(api_error(StatusCode::BAD_REQUEST, err)),
    }
}

async fn submit_score(
    State(state): State<ServerState>,
    Json(payload): Json<SubmitScoreRequest>,
) -> Result<Json<SubmitScoreResponse>, ApiError> {
    let result = state.store().submit(&payload);
    match result {
        Ok(score) => {
            log::info!("score {score} for player {:?}", payload.player_id);
            Ok(Json(SubmitScoreResponse {
                success: true,
                message: "Score submitted successfully".to_string(),
                score,
            }))
        }
        Err(err) => Err(api_error(StatusCode::BAD_REQUEST, err)),
    }
}

#[derive(Debug, Deserialize)]
struct LeaderboardQuery {
    limit: Option<usize>,
    period: Option<String>,
}

async fn leaderboard(
    State(state): State<ServerState>,
    Query(query): Query<LeaderboardQuery>,
) -> Json<LeaderboardResponse> {
    let period = query.period.unwrap_or_else(|| "all".to_string());
    let rows = state.store().leaderboard(
        query.limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT),
        Period::parse(&period),
    );
    Json(LeaderboardResponse {
        success: true,
        total_players: rows.len(),
        leaderboard: rows,
        period,
    })
}

async fn player_stats(
    State(state): State<ServerState>,
    Path(player_id): Path<i64>,
) -> Result<Json<PlayerStatsResponse>, ApiError> {
    let stats = state.store().player_stats(player_id);
    stats
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, StoreError::UnknownPlayer(player_id)))
}

async fn global_stats(State(state): State<ServerState>) -> Json<GlobalStatsResponse> {
    let stats = state.store().global_stats();
    Json(GlobalStatsResponse {
        success: true,
        stats,
    })
}

pub fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/player/register", post(register_player))
        .route("/api/score/submit", post(submit_score))
        .route("/api/leaderboard", get(leaderboard))
        .route("/api/player/:id/stats", get(player_stats))
        .route("/api/stats/global", get(global_stats))
        .with_state(state)
        .layer(cors)
}

/// `AEROGESTURE_SERVER_ADDR` wins, then `AEROGESTURE_SERVER_PORT` on localhost, then
/// `fallback_port`.
pub fn resolve_server_addr<F>(fallback_port: u16, mut get_env: F) -> SocketAddr
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(addr) = get_env(SERVER_ADDR_ENV).and_then(|v| v.parse().ok()) {
        return addr;
    }
    let port = get_env(SERVER_PORT_ENV)
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(fallback_port);
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

/// A running scoring service on its own thread and runtime.
#[derive(Debug)]
pub struct ScoreServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ScoreServer {
    /// Binds before returning so a taken port fails here. Port 0 picks a free one; see
    /// [`ScoreServer::local_addr`].
    pub fn start(addr: SocketAddr) -> io::Result<Self> {
        Self::start_with_state(addr, ServerState::new())
    }

    pub fn start_with_state(addr: SocketAddr, state: ServerState) -> io::Result<Self> {
        let std_listener = TcpListener::bind(addr)?;
        std_listener.set_nonblocking(true)?;
        let addr = std_listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("score-server")
            .enable_all()
            .build()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = thread::Builder::new()
            .name("score-server".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let listener = match tokio::net::TcpListener::from_std(std_listener) {
                        Ok(listener) => listener,
                        Err(err) => {
                            log::error!("score server listener: {err}");
                            return;
                        }
                    };
                    let serve = axum::serve(listener, router(state)).with_graceful_shutdown(
                        async move {
                            let _ = shutdown_rx.await;
                        },
                    );
                    if let Err(err) = serve.await {
                        log::error!("score server error: {err}");
                    }
                });
            })?;

        log::info!("score server listening on http://{addr}/api");
        Ok(Self {
            addr,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL a [`crate::sync::ScoreClient`] should use.
    pub fn base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("score server thread panicked");
            }
        }
    }
}

impl Drop for ScoreServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submit(player_id: i64, score: u32) -> SubmitScoreRequest {
        SubmitScoreRequest {
            player_id: Some(player_id),
            score: Some(score),
            duration: 4.0,
            pipes_passed: Some(score),
        }
    }

    #[test]
    fn register_is_idempotent_per_name() {
        let mut store = ScoreStore::new();
        assert_eq!(store.register("ACE"), Ok((1, true)));
        assert_eq!(store.register("  ACE "), Ok((1, false)));
        assert_eq!(store.register("BOB"), Ok((2, true)));
        assert_eq!(store.register("   "), Err(StoreError::UsernameRequired));
    }

    #[test]
    fn submit_requires_known_player_and_score() {
        let mut store = ScoreStore::new();
        let (id, _) = store.register("ACE").unwrap();
        assert_eq!(store.submit(&submit(id, 3)), Ok(3));
        assert_eq!(
            store.submit(&submit(99, 3)),
            Err(StoreError::UnknownPlayer(99))
        );
        let missing = SubmitScoreRequest {
            player_id: None,
            ..submit(id, 1)
        };
        assert_eq!(store.submit(&missing), Err(StoreError::MissingFields));
    }

    #[test]
    fn leaderboard_orders_by_best_with_unscored_last() {
        let mut store = ScoreStore::new();
        let (idle, _) = store.register("IDLE").unwrap();
        let (ace, _) = store.register("ACE").unwrap();
        let (bob, _) = store.register("BOB").unwrap();
        store.submit(&submit(ace, 4)).unwrap();
        store.submit(&submit(ace, 9)).unwrap();
        store.submit(&submit(bob, 6)).unwrap();

        let rows = store.leaderboard(10, Period::All);
        let names: Vec<&str> = rows.iter().map(|r| r.username.as_str()).collect();
        assert_eq!(names, vec!["ACE", "BOB", "IDLE"]);
        assert_eq!(rows[0].best_score, Some(9));
        assert_eq!(rows[0].games_played, 2);
        assert_eq!(rows[0].avg_score, Some(6.5));
        assert_eq!(rows[2].best_score, None);
        assert_eq!(store.leaderboard(1, Period::All).len(), 1);
        assert!(store.player_stats(idle).unwrap().recent_games.is_empty());
    }

    #[test]
    fn timestamps_match_sqlite_format() {
        assert_eq!(sqlite_timestamp(0), "1970-01-01 00:00:00");
        assert_eq!(sqlite_timestamp(951_782_400), "2000-02-29 00:00:00");
        assert_eq!(sqlite_timestamp(1_700_000_000), "2023-11-14 22:13:20");
    }

    #[test]
    fn period_limits_which_games_count() {
        let now = 100 * SECS_PER_DAY + 3_600;
        let mut store = ScoreStore::new();
        let (ace, _) = store.register("ACE").unwrap();
        let (bob, _) = store.register("BOB").unwrap();
        store.register("IDLE").unwrap();
        for (player_id, score, age) in [
            (ace, 3, 60),
            (ace, 9, 3 * SECS_PER_DAY),
            (bob, 20, 10 * SECS_PER_DAY),
        ] {
            store.sessions.push(SessionRecord {
                player_id,
                score,
                duration: 1.0,
                pipes_passed: score,
                created_at: now - age,
            });
        }

        let names = |rows: &[LeaderboardRow]| -> Vec<String> {
            rows.iter().map(|r| r.username.clone()).collect()
        };

        let all = store.leaderboard_at(10, Period::All, now);
        assert_eq!(names(&all), vec!["BOB", "ACE", "IDLE"]);

        let week = store.leaderboard_at(10, Period::Week, now);
        assert_eq!(names(&week), vec!["ACE"]);
        assert_eq!(week[0].best_score, Some(9));
        assert_eq!(week[0].games_played, 2);

        let today = store.leaderboard_at(10, Period::Today, now);
        assert_eq!(names(&today), vec!["ACE"]);
        assert_eq!(today[0].best_score, Some(3));
        assert_eq!(today[0].avg_score, Some(3.0));
    }

    #[test]
    fn unknown_period_counts_everything() {
        assert_eq!(Period::parse("week"), Period::Week);
        assert_eq!(Period::parse("today"), Period::Today);
        assert_eq!(Period::parse("month"), Period::All);
    }

    #[test]
    fn global_stats_summarize_sessions() {
        let mut store = ScoreStore::new();
        assert_eq!(store.global_stats(), GlobalStats::default());

        let (ace, _) = store.register("ACE").unwrap();
        let (bob, _) = store.register("BOB").unwrap();
        store.submit(&submit(ace, 2)).unwrap();
        store.submit(&submit(bob, 8)).unwrap();

        let stats = store.global_stats();
        assert_eq!(stats.total_players, 2);
        assert_eq!(stats.total_games, 2);
        assert_eq!(stats.highest_score, Some(8));
        assert_eq!(stats.total_playtime, Some(8.0));
        assert_eq!(
            stats.top_player,
            Some(TopPlayer {
                username: "BOB".to_string(),
                score: 8
            })
        );
    }

    #[test]
    fn resolve_server_addr_defaults_to_fallback_port() {
        let addr = resolve_server_addr(DEFAULT_PORT, |_| None);
        assert_eq!(addr, SocketAddr::from(([127, 0, 0, 1], 5000)));
    }

    #[test]
    fn resolve_server_addr_prefers_explicit_addr() {
        let addr = resolve_server_addr(DEFAULT_PORT, |k| match k {
            SERVER_ADDR_ENV => Some("0.0.0.0:5050".to_string()),
            SERVER_PORT_ENV => Some("5051".to_string()),
            _ => None,
        });
        assert_eq!(addr, "0.0.0.0:5050".parse().unwrap());
    }

    #[test]
    fn resolve_server_addr_ignores_invalid_addr_but_uses_valid_port() {
        let addr = resolve_server_addr(DEFAULT_PORT, |k| match k {
            SERVER_ADDR_ENV => Some("nope".to_string()),
            SERVER_PORT_ENV => Some("5052".to_string()),
            _ => None,
        });
        assert_eq!(addr, SocketAddr::from(([127, 0, 0, 1], 5052)));
    }
}
