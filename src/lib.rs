pub mod config;
pub mod db;
pub mod keyed_lock;
pub mod protocol;
pub mod session;
pub mod telemetry;
pub mod transport;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use log::{debug, info, warn};
use tokio::{
    io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    sync::mpsc,
    time,
};
use tokio_util::sync::CancellationToken;

use config::HubConfig;
use db::Database;
use session::{SessionController, SessionTimers};
use telemetry::{run_ingest_loop, Dispatcher, ScoreTracker, SensorTracker};
use transport::{ChannelPublisher, CommandPublisher, InboundFrame, OutboundFrame};

const INBOUND_QUEUE_DEPTH: usize = 256;
const OUTBOUND_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// The wired-up engine: one store shared by telemetry ingestion and the
/// session controller.
#[derive(Clone)]
pub struct Hub {
    pub db: Database,
    pub sessions: SessionController,
    pub dispatcher: Dispatcher,
}

impl Hub {
    pub fn new(
        db: Database,
        config: &HubConfig,
        publisher: Arc<dyn CommandPublisher>,
    ) -> Result<Self> {
        let sensors = SensorTracker::new(
            db.clone(),
            config.sensors_per_client,
            config.active_sensor_code.clone(),
        );
        let scores = ScoreTracker::new(db.clone());
        let sessions = SessionController::new(
            db.clone(),
            publisher,
            SessionTimers::new(config.timer_unit()),
            config.liveness_window()?,
        );

        Ok(Self {
            db,
            sessions,
            dispatcher: Dispatcher::new(sensors, scores),
        })
    }
}

/// Runs the hub against the line bridge: `topic payload` lines on stdin are
/// telemetry, device commands are written to stdout in the same format.
pub async fn run() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("fieldhub starting up...");

    let config = HubConfig::load()?;
    let database = Database::new(config.database_path.clone())?;
    let (publisher, outbound) = ChannelPublisher::new(config.command_topic_prefix.clone());
    let hub = Hub::new(database, &config, Arc::new(publisher))?;

    // Close or re-arm rounds that were running when the process last stopped.
    let recovered = hub.sessions.recover_active_sessions().await?;
    if recovered.completed > 0 || recovered.rearmed > 0 {
        info!(
            "Recovered active sessions: {} completed, {} re-armed",
            recovered.completed, recovered.rearmed
        );
    }

    let cancel_token = CancellationToken::new();
    let (frames_tx, frames_rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);
    let ingest = tokio::spawn(run_ingest_loop(
        frames_rx,
        hub.dispatcher.clone(),
        cancel_token.clone(),
    ));
    let writer = tokio::spawn(write_outbound(outbound, tokio::io::stdout()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Inbound stream closed");
                    break;
                };
                let Some(frame) = InboundFrame::from_line(&line) else {
                    if !line.trim().is_empty() {
                        warn!("Ignoring unparseable bridge line {line:?}");
                    }
                    continue;
                };
                if !config.is_telemetry_topic(&frame.topic) {
                    debug!("Ignoring frame on unsubscribed topic {}", frame.topic);
                    continue;
                }
                if frames_tx.send(frame).await.is_err() {
                    warn!("Ingestion loop stopped; no longer reading input");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received");
                break;
            }
        }
    }

    cancel_token.cancel();
    drop(frames_tx);
    if let Err(err) = ingest.await {
        warn!("Ingestion task ended abnormally: {err}");
    }

    // Armed timers hold controller clones. Once they and the hub are gone the
    // last publisher sender drops and the writer flushes what is queued.
    let disarmed = hub.sessions.timers().disarm_all();
    if disarmed > 0 {
        info!("Disarmed {disarmed} round timer(s) on shutdown");
    }
    drop(hub);
    match time::timeout(OUTBOUND_DRAIN_TIMEOUT, writer).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(err))) => warn!("Outbound writer failed: {err:?}"),
        Ok(Err(err)) => warn!("Outbound writer ended abnormally: {err}"),
        Err(_) => warn!("Outbound commands not drained within {OUTBOUND_DRAIN_TIMEOUT:?}"),
    }

    info!("fieldhub stopped");
    Ok(())
}

/// Writes `topic payload` lines until every publisher has been dropped.
async fn write_outbound<W>(
    mut outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    mut sink: W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        sink.write_all(format!("{} {}\n", frame.topic, frame.payload).as_bytes())
            .await?;
        sink.flush().await?;
    }
    Ok(())
}
