pub mod dispatcher;
pub mod scores;
pub mod sensors;

pub use dispatcher::{run_ingest_loop, Dispatcher, FrameOutcome};
pub use scores::ScoreTracker;
pub use sensors::{BatchOutcome, SensorTracker};
