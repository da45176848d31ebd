pub mod connection;
pub mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use repositories::StateWrite;
pub use models::{
    Client, Device, DeviceScore, DeviceStatus, GameScoreReport, GameSession, PlayerStatus,
    Sensor, SensorStatus, SensorStatusChange, SensorTransaction, SessionPlayer, TransactionKind,
};
