use std::net::{SocketAddr, TcpListener};
use std::time::{Duration, Instant};

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use serde_json::{Value, json};

use aerogesture::config::NetworkConfig;
use aerogesture::server::ScoreServer;
use aerogesture::state::Effect;
use aerogesture::sync::{LeaderboardEntry, Registration, ScoreClient, ScoreSync};

const IDLE: Duration = Duration::from_secs(5);

fn local() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

fn sync_for(base_url: String) -> ScoreSync {
    let network = NetworkConfig {
        api_url: Some(base_url),
        timeout: Duration::from_millis(500),
        ..NetworkConfig::default()
    };
    let sync = ScoreSync::new(&network).expect("score sync runtime");
    assert!(sync.is_online());
    sync
}

/// A base URL on a port nobody listens on any more.
fn dead_url() -> String {
    let mut server = ScoreServer::start(local()).expect("start server");
    let url = server.base_url();
    server.shutdown();
    url
}

fn entry(name: &str, best: u32) -> LeaderboardEntry {
    LeaderboardEntry {
        username: name.to_string(),
        best_score: best,
        games_played: 1,
        avg_score: f64::from(best),
    }
}

/// Bodies shaped like the hosted service's: text timestamps, averages, and a submit
/// reply without the echoed score.
fn remote_leaderboard() -> Value {
    json!({
        "success": true,
        "leaderboard": [
            {"username": "ACE", "best_score": 9, "games_played": 2, "avg_score": 6.5,
             "joined_date": "2026-10-18 12:00:00"},
            {"username": "NEW", "best_score": null, "games_played": 0, "avg_score": null,
             "joined_date": "2026-10-18 12:05:00"}
        ],
        "period": "all",
        "total_players": 2
    })
}

async fn start_remote_stub() -> String {
    let app = Router::new()
        .route("/api/leaderboard", get(|| async { Json(remote_leaderboard()) }))
        .route(
            "/api/score/submit",
            post(|| async { Json(json!({"success": true})) }),
        )
        .route("/bare/score/submit", post(|| async { StatusCode::OK }));
    let listener = tokio::net::TcpListener::bind(local()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });
    format!("http://{addr}")
}

#[tokio::test]
async fn client_round_trip_against_local_server() {
    let server = ScoreServer::start(local()).expect("start server");
    let client = ScoreClient::new(&server.base_url(), Duration::from_secs(2)).unwrap();

    let id = client.register_player("ACE").await.expect("registered");
    assert_eq!(client.register_player("ACE").await, Some(id));
    client.register_player("IDLE").await.expect("registered");

    assert!(client.submit_score(Some(id), 4, Duration::from_secs(9)).await);
    assert!(!client.submit_score(None, 4, Duration::from_secs(9)).await);
    assert!(!client.submit_score(Some(999), 4, Duration::from_secs(9)).await);

    let board = client.fetch_leaderboard(10).await.expect("leaderboard");
    assert_eq!(board[0].username, "ACE");
    assert_eq!(board[0].best_score, 4);
    assert_eq!(board[0].avg_score, 4.0);
    assert_eq!(board[1].username, "IDLE");
    assert_eq!(board[1].best_score, 0);
    assert_eq!(board[1].avg_score, 0.0);
}

#[tokio::test]
async fn client_reads_the_hosted_service_shapes() {
    let root = start_remote_stub().await;
    let client = ScoreClient::new(&format!("{root}/api"), Duration::from_secs(2)).unwrap();

    let board = client.fetch_leaderboard(10).await.expect("leaderboard");
    assert_eq!(board.len(), 2);
    assert_eq!(board[0].username, "ACE");
    assert_eq!(board[0].avg_score, 6.5);
    assert_eq!(board[1].best_score, 0);
    assert_eq!(board[1].avg_score, 0.0);

    assert!(client.submit_score(Some(1), 5, Duration::from_secs(3)).await);

    let bare = ScoreClient::new(&format!("{root}/bare"), Duration::from_secs(2)).unwrap();
    assert!(bare.submit_score(Some(1), 5, Duration::from_secs(3)).await);
}

#[tokio::test]
async fn silent_service_times_out() {
    // Accepts connections (via the backlog) but never answers.
    let listener = TcpListener::bind(local()).unwrap();
    let url = format!("http://{}/api", listener.local_addr().unwrap());
    let client = ScoreClient::new(&url, Duration::from_millis(200)).unwrap();

    let started = Instant::now();
    assert_eq!(client.register_player("ACE").await, None);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn registration_result_comes_back_tagged() {
    let server = ScoreServer::start(local()).expect("start server");
    let sync = sync_for(server.base_url());

    sync.dispatch(Effect::RegisterPlayer {
        generation: 4,
        username: "ACE".to_string(),
    });
    assert!(sync.wait_idle(IDLE));
    assert_eq!(
        sync.take_registrations(),
        vec![Registration {
            generation: 4,
            player_id: Some(1),
        }]
    );
}

#[test]
fn failed_registration_leaves_player_id_empty() {
    let sync = sync_for(dead_url());
    sync.dispatch(Effect::RegisterPlayer {
        generation: 1,
        username: "ACE".to_string(),
    });
    assert!(sync.wait_idle(IDLE));
    assert_eq!(
        sync.take_registrations(),
        vec![Registration {
            generation: 1,
            player_id: None,
        }]
    );
}

#[test]
fn leaderboard_cache_is_replaced_wholesale() {
    let server = ScoreServer::start(local()).expect("start server");
    let sync = sync_for(server.base_url());
    sync.leaderboard_slot().replace(vec![entry("A", 9), entry("B", 5)]);

    sync.dispatch(Effect::RegisterPlayer {
        generation: 1,
        username: "C".to_string(),
    });
    assert!(sync.wait_idle(IDLE));
    sync.dispatch(Effect::SubmitScore {
        player_id: Some(1),
        score: 3,
        duration: Duration::from_secs(4),
    });
    assert!(sync.wait_idle(IDLE));
    sync.dispatch(Effect::FetchLeaderboard { limit: 10 });
    assert!(sync.wait_idle(IDLE));

    assert_eq!(sync.leaderboard(), vec![entry("C", 3)]);
}

#[test]
fn failed_fetch_keeps_previous_cache() {
    let sync = sync_for(dead_url());
    sync.leaderboard_slot().replace(vec![entry("A", 9)]);

    sync.dispatch(Effect::FetchLeaderboard { limit: 10 });
    assert!(sync.wait_idle(IDLE));
    assert_eq!(sync.leaderboard(), vec![entry("A", 9)]);
}

#[test]
fn dispatch_returns_before_the_call_completes() {
    let listener = TcpListener::bind(local()).unwrap();
    let sync = sync_for(format!("http://{}/api", listener.local_addr().unwrap()));

    let started = Instant::now();
    sync.dispatch(Effect::FetchLeaderboard { limit: 10 });
    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(sync.in_flight(), 1);
    assert!(sync.wait_idle(IDLE));
    assert!(sync.leaderboard().is_empty());
}
