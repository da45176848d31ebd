pub mod device;
pub mod game_session;
pub mod sensor;

pub use device::{Device, DeviceScore, DeviceStatus, GameScoreReport};
pub use game_session::{GameSession, PlayerStatus, SessionPlayer};
pub use sensor::{Client, Sensor, SensorStatus, SensorStatusChange, SensorTransaction, TransactionKind};
