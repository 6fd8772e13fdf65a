pub mod collision;
pub mod config;
pub mod driver;
pub mod gesture;
pub mod gesture_worker;
pub mod input;
pub mod obstacles;
pub mod physics;
pub mod serde_duration;
pub mod server;
pub mod state;
pub mod sync;
