//! JSON bodies of the scoring service, shared by the client and the local server.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterResponse {
    #[serde(default)]
    pub success: bool,
    pub player_id: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub message: String,
}

/// `duration` is in seconds. `pipes_passed` mirrors `score` since one pair is one point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitScoreRequest {
    pub player_id: Option<i64>,
    pub score: Option<u32>,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub pipes_passed: Option<u32>,
}

/// Sent by the local server. The client only looks at the status code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitScoreResponse {
    pub success: bool,
    pub message: String,
    pub score: u32,
}

/// One leaderboard row as the service sends it. Players who never finished a game
/// have no best or average score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub username: String,
    pub best_score: Option<u32>,
    #[serde(default)]
    pub games_played: u32,
    #[serde(default)]
    pub avg_score: Option<f64>,
    /// SQLite-style `YYYY-MM-DD HH:MM:SS` timestamp (UTC).
    #[serde(default)]
    pub joined_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub leaderboard: Vec<LeaderboardRow>,
    #[serde(default)]
    pub period: String,
    #[serde(default)]
    pub total_players: usize,
}

/// A leaderboard row as the game displays it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub username: String,
    pub best_score: u32,
    pub games_played: u32,
    pub avg_score: f64,
}

impl From<LeaderboardRow> for LeaderboardEntry {
    fn from(row: LeaderboardRow) -> Self {
        Self {
            username: row.username,
            best_score: row.best_score.unwrap_or(0),
            games_played: row.games_played,
            avg_score: row.avg_score.unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: i64,
    pub username: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub score: u32,
    pub duration: f64,
    pub pipes_passed: u32,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub total_games: u32,
    pub best_score: Option<u32>,
    pub avg_score: Option<f64>,
    pub total_score: Option<u64>,
    pub avg_duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStatsResponse {
    pub success: bool,
    pub player: PlayerRecord,
    pub stats: PlayerStats,
    pub recent_games: Vec<GameRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopPlayer {
    pub username: String,
    pub score: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    pub total_players: u32,
    pub total_games: u32,
    pub highest_score: Option<u32>,
    pub avg_score: Option<f64>,
    pub total_playtime: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_player: Option<TopPlayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalStatsResponse {
    pub success: bool,
    pub stats: GlobalStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
