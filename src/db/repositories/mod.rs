mod devices;
mod game_sessions;
mod sensors;

pub use game_sessions::StateWrite;
