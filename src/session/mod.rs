pub mod controller;
pub mod error;
pub mod state;
pub mod timers;
pub mod validation;

pub use controller::{
    RecoverySummary, SessionController, SessionProgress, SessionResults, SessionSetup,
};
pub use error::{SessionError, SetupError};
pub use state::{SessionEvent, SessionState};
pub use timers::SessionTimers;
pub use validation::validate_setup;
