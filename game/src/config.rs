use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const API_URL_ENV: &str = "AEROGESTURE_API_URL";
pub const CONFIG_PATH_ENV: &str = "AEROGESTURE_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidThresholds { trigger: f32, release: f32 },
    InvalidAlpha(f32),
    GapDoesNotFit { gap: f32, clearance: f32, height: f32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidThresholds { trigger, release } => write!(
                f,
                "gesture trigger ({trigger}) must be below release ({release})"
            ),
            ConfigError::InvalidAlpha(alpha) => {
                write!(f, "smoothing alpha must be in (0, 1], got {alpha}")
            }
            ConfigError::GapDoesNotFit {
                gap,
                clearance,
                height,
            } => write!(
                f,
                "gap {gap} plus two clearances of {clearance} does not fit a playfield of height {height}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayfieldConfig {
    pub width: f32,
    pub height: f32,
}

impl Default for PlayfieldConfig {
    fn default() -> Self {
        Self {
            width: 640.0,
            height: 480.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhysicsConfig {
    pub gravity: f32,
    pub flap_impulse: f32,
    pub max_fall_speed: f32,
    pub body_radius: f32,
    pub body_x: f32,
    pub rotation_rate: f32,
    pub rise_angle_deg: f32,
    pub fall_angle_deg: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: 1700.0,
            flap_impulse: -550.0,
            max_fall_speed: 800.0,
            body_radius: 20.0,
            body_x: 100.0,
            rotation_rate: 8.0,
            rise_angle_deg: -30.0,
            fall_angle_deg: 45.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObstacleConfig {
    pub speed: f32,
    pub width: f32,
    pub gap_height: f32,
    pub min_clearance: f32,
    #[serde(rename = "spawn_interval_ms", with = "crate::serde_duration")]
    pub spawn_interval: Duration,
    /// Distance past the right edge of the playfield where new pairs appear.
    pub spawn_offset: f32,
}

impl Default for ObstacleConfig {
    fn default() -> Self {
        Self {
            speed: 240.0,
            width: 80.0,
            gap_height: 180.0,
            min_clearance: 55.0,
            spawn_interval: Duration::from_secs(2),
            spawn_offset: 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GestureConfig {
    pub alpha: f32,
    pub trigger: f32,
    pub release: f32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            trigger: 45.0,
            release: 65.0,
        }
    }
}

impl GestureConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(ConfigError::InvalidAlpha(self.alpha));
        }
        if !(self.trigger < self.release) {
            return Err(ConfigError::InvalidThresholds {
                trigger: self.trigger,
                release: self.release,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FrameConfig {
    #[serde(rename = "max_dt_ms", with = "crate::serde_duration")]
    pub max_dt: Duration,
    pub target_fps: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_dt: Duration::from_millis(50),
            target_fps: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Base URL of the scoring service, e.g. `http://localhost:5000/api`. `None` plays offline.
    pub api_url: Option<String>,
    #[serde(rename = "timeout_ms", with = "crate::serde_duration")]
    pub timeout: Duration,
    pub leaderboard_limit: u32,
    #[serde(rename = "leaderboard_refresh_ms", with = "crate::serde_duration")]
    pub leaderboard_refresh: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            timeout: Duration::from_secs(3),
            leaderboard_limit: 10,
            leaderboard_refresh: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub playfield: PlayfieldConfig,
    #[serde(default)]
    pub physics: PhysicsConfig,
    #[serde(default)]
    pub obstacles: ObstacleConfig,
    #[serde(default)]
    pub gesture: GestureConfig,
    #[serde(default)]
    pub frame: FrameConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            playfield: PlayfieldConfig::default(),
            physics: PhysicsConfig::default(),
            obstacles: ObstacleConfig::default(),
            gesture: GestureConfig::default(),
            frame: FrameConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl GameConfig {
    /// Clamps values that would make the simulation degenerate. Threshold ordering is left
    /// to `validate`, since there is no obviously right way to repair it.
    pub fn sanitized(mut self) -> Self {
        self.version = default_version();
        self.playfield.width = self.playfield.width.max(1.0);
        self.playfield.height = self.playfield.height.max(1.0);
        self.physics.max_fall_speed = self.physics.max_fall_speed.max(0.0);
        self.physics.body_radius = self.physics.body_radius.max(1.0);
        self.obstacles.speed = self.obstacles.speed.max(0.0);
        self.obstacles.width = self.obstacles.width.max(1.0);
        self.obstacles.min_clearance = self.obstacles.min_clearance.max(0.0);
        self.obstacles.spawn_interval = self
            .obstacles
            .spawn_interval
            .max(Duration::from_millis(100));
        self.gesture.alpha = self.gesture.alpha.clamp(0.01, 1.0);
        self.frame.max_dt = self.frame.max_dt.max(Duration::from_millis(1));
        self.network.timeout = self.network.timeout.max(Duration::from_millis(100));
        self.network.leaderboard_limit = self.network.leaderboard_limit.clamp(1, 100);
        self.network.api_url = self
            .network
            .api_url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gesture.validate()?;
        let o = &self.obstacles;
        if o.gap_height + 2.0 * o.min_clearance > self.playfield.height {
            return Err(ConfigError::GapDoesNotFit {
                gap: o.gap_height,
                clearance: o.min_clearance,
                height: self.playfield.height,
            });
        }
        Ok(())
    }

    pub fn with_env_overrides<F>(mut self, mut get_env: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(url) = get_env(API_URL_ENV) {
            self.network.api_url = Some(url);
        }
        self.sanitized()
    }
}

fn default_version() -> u32 {
    1
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_env() -> Self {
        Self::resolve(|key| std::env::var(key).ok())
    }

    pub fn resolve<F>(mut get_env: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(explicit) = get_env(CONFIG_PATH_ENV) {
            return Self::new(explicit);
        }

        let base = get_env("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| {
                get_env("HOME").map(|home| {
                    let mut p = PathBuf::from(home);
                    p.push(".config");
                    p
                })
            })
            .unwrap_or_else(|| PathBuf::from("."));

        let mut path = base;
        path.push("aerogesture");
        path.push("config.json");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable files fall back to defaults; the game must still start.
    pub fn load(&self) -> GameConfig {
        let Ok(bytes) = fs::read(&self.path) else {
            log::debug!("no config at {}; using defaults", self.path.display());
            return GameConfig::default();
        };
        match serde_json::from_slice::<GameConfig>(&bytes) {
            Ok(config) => config.sanitized(),
            Err(err) => {
                log::warn!(
                    "ignoring invalid config {}: {err}",
                    self.path.display()
                );
                GameConfig::default()
            }
        }
    }

    pub fn save(&self, config: &GameConfig) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(config)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&self.path, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("aerogesture-config-{}-{name}", std::process::id()))
            .join("config.json")
    }

    #[test]
    fn defaults_validate() {
        assert_eq!(GameConfig::default().validate(), Ok(()));
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let mut config = GameConfig::default();
        config.gesture.trigger = 70.0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidThresholds {
                trigger: 70.0,
                release: 65.0
            })
        );
    }

    #[test]
    fn oversized_gap_is_rejected() {
        let mut config = GameConfig::default();
        config.obstacles.gap_height = 400.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::GapDoesNotFit { .. })
        ));
    }

    #[test]
    fn sanitized_clamps_expected_fields() {
        let mut config = GameConfig {
            version: 42,
            ..GameConfig::default()
        };
        config.gesture.alpha = 3.0;
        config.network.leaderboard_limit = 0;
        config.network.api_url = Some(" http://localhost:5000/api/ ".to_string());
        config.frame.max_dt = Duration::ZERO;

        let config = config.sanitized();
        assert_eq!(config.version, 1);
        assert_eq!(config.gesture.alpha, 1.0);
        assert_eq!(config.network.leaderboard_limit, 1);
        assert_eq!(
            config.network.api_url.as_deref(),
            Some("http://localhost:5000/api")
        );
        assert_eq!(config.frame.max_dt, Duration::from_millis(1));
    }

    #[test]
    fn blank_api_url_means_offline() {
        let mut config = GameConfig::default();
        config.network.api_url = Some("   ".to_string());
        assert_eq!(config.sanitized().network.api_url, None);
    }

    #[test]
    fn serde_defaults_fill_missing_fields() {
        let parsed: GameConfig =
            serde_json::from_str(r#"{"version":1,"gesture":{"trigger":40.0},"frame":{"max_dt_ms":33}}"#)
                .expect("config JSON should parse");
        assert_eq!(parsed.gesture.trigger, 40.0);
        assert_eq!(parsed.gesture.release, 65.0);
        assert_eq!(parsed.frame.max_dt, Duration::from_millis(33));
        assert_eq!(parsed.frame.target_fps, 90);
        assert_eq!(parsed.physics, PhysicsConfig::default());
        assert_eq!(parsed.network, NetworkConfig::default());
    }

    #[test]
    fn env_override_sets_api_url() {
        let config = GameConfig::default().with_env_overrides(|key| match key {
            API_URL_ENV => Some("http://127.0.0.1:9000/api".to_string()),
            _ => None,
        });
        assert_eq!(
            config.network.api_url.as_deref(),
            Some("http://127.0.0.1:9000/api")
        );
    }

    #[test]
    fn resolve_prefers_explicit_path() {
        let store = ConfigStore::resolve(|key| match key {
            CONFIG_PATH_ENV => Some("/tmp/custom.json".to_string()),
            "HOME" => Some("/home/ace".to_string()),
            _ => None,
        });
        assert_eq!(store.path(), Path::new("/tmp/custom.json"));
    }

    #[test]
    fn resolve_falls_back_to_home_config_dir() {
        let store = ConfigStore::resolve(|key| match key {
            "HOME" => Some("/home/ace".to_string()),
            _ => None,
        });
        assert_eq!(
            store.path(),
            Path::new("/home/ace/.config/aerogesture/config.json")
        );
    }

    #[test]
    fn save_then_load_preserves_tuning() {
        let store = ConfigStore::new(temp_path("roundtrip"));
        let mut config = GameConfig::default();
        config.physics.gravity = 1500.0;
        config.network.api_url = Some("http://localhost:5000/api".to_string());

        store.save(&config).expect("save config");
        assert_eq!(store.load(), config);
    }

    #[test]
    fn load_falls_back_on_garbage() {
        let path = temp_path("garbage");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not json").unwrap();
        assert_eq!(ConfigStore::new(path).load(), GameConfig::default());
    }
}
