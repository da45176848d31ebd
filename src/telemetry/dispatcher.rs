use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use anyhow::Result;
use log::{debug, error, info, warn};
use tokio::{sync::mpsc, task::JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{
    protocol::{classify, frame_key, FrameError, TelemetryMessage},
    transport::InboundFrame,
};

use super::{
    scores::ScoreTracker,
    sensors::{BatchOutcome, SensorTracker},
};

/// What happened to one inbound frame. Failures are already logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    Applied(&'static str),
    /// Well-formed, but nothing to do (unknown device, oversized batch).
    Ignored(&'static str),
    Dropped(FrameError),
    Failed(&'static str),
}

#[derive(Clone)]
pub struct Dispatcher {
    sensors: SensorTracker,
    scores: ScoreTracker,
}

impl Dispatcher {
    pub fn new(sensors: SensorTracker, scores: ScoreTracker) -> Self {
        Self { sensors, scores }
    }

    /// Classifies and applies one frame. Never returns an error: bad input
    /// and store failures are logged and reported through the outcome.
    pub async fn handle_frame(&self, frame: &InboundFrame) -> FrameOutcome {
        let message = match classify(&frame.payload) {
            Ok(message) => message,
            Err(err) => {
                warn!(
                    "Dropping frame on {}: {err} (payload {:?})",
                    frame.topic, frame.payload
                );
                return FrameOutcome::Dropped(err);
            }
        };

        let kind = message.kind();
        match self.apply(message).await {
            Ok(true) => FrameOutcome::Applied(kind),
            Ok(false) => FrameOutcome::Ignored(kind),
            Err(err) => {
                error!("Failed to apply {kind} frame from {}: {err:?}", frame.topic);
                FrameOutcome::Failed(kind)
            }
        }
    }

    async fn apply(&self, message: TelemetryMessage) -> Result<bool> {
        match message {
            TelemetryMessage::SensorBatch { client_id, codes } => {
                let outcome = self.sensors.apply_batch(&client_id, &codes).await?;
                Ok(matches!(outcome, BatchOutcome::Applied { .. }))
            }
            TelemetryMessage::DeviceScore {
                device_number,
                counters,
            } => {
                self.scores
                    .apply_score_update(&device_number, counters)
                    .await?;
                Ok(true)
            }
            TelemetryMessage::DeviceGameStatus {
                device_number,
                status,
            } => {
                debug!("Device {device_number} reported game status {status}");
                self.scores
                    .apply_status_update(&device_number, status)
                    .await?;
                Ok(true)
            }
            TelemetryMessage::Heartbeat { device_number } => {
                self.scores.record_heartbeat(&device_number).await
            }
        }
    }
}

/// Number of serial workers frames are sharded across.
pub const INGEST_WORKERS: usize = 8;
const WORKER_QUEUE_DEPTH: usize = 64;

fn shard_for(frame: &InboundFrame, shards: usize) -> usize {
    // Unkeyed frames are dropped by the classifier; any shard will do.
    let Some(key) = frame_key(&frame.payload) else {
        return 0;
    };
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

async fn run_worker(mut frames: mpsc::Receiver<InboundFrame>, dispatcher: Dispatcher) {
    while let Some(frame) = frames.recv().await {
        dispatcher.handle_frame(&frame).await;
    }
}

/// Pulls frames until the channel closes or `cancel_token` fires.
///
/// Frames are sharded by the identifier in field 0 onto serial workers, so
/// frames for one client or device are applied in arrival order while
/// different keys proceed concurrently. Queued frames are drained before
/// returning.
pub async fn run_ingest_loop(
    mut frames: mpsc::Receiver<InboundFrame>,
    dispatcher: Dispatcher,
    cancel_token: CancellationToken,
) {
    let mut workers = JoinSet::new();
    let mut shards = Vec::with_capacity(INGEST_WORKERS);
    for _ in 0..INGEST_WORKERS {
        let (tx, rx) = mpsc::channel(WORKER_QUEUE_DEPTH);
        workers.spawn(run_worker(rx, dispatcher.clone()));
        shards.push(tx);
    }

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    info!("Inbound frame channel closed");
                    break;
                };
                let shard = shard_for(&frame, shards.len());
                if shards[shard].send(frame).await.is_err() {
                    error!("Ingest worker {shard} is gone; stopping ingestion");
                    break;
                }
            }
            _ = cancel_token.cancelled() => {
                info!("Ingestion loop shutting down");
                break;
            }
        }
    }

    drop(shards);
    while let Some(joined) = workers.join_next().await {
        if let Err(err) = joined {
            error!("Ingest worker panicked: {err}");
        }
    }
}
