//! Measurement pipeline
//!
//! One run walks `Connecting -> Ping -> Download -> Upload -> Complete`
//! against a single server. Progress goes out on a broadcast channel of
//! [`PipelineEvent`]s; the current phase and last fatal error sit in a
//! watch channel so late observers can render one consistent state.
//!
//! Only one run may be active at a time. A second `start` is rejected with
//! [`MeasurementError::AlreadyRunning`].

mod ping;
mod throughput;
pub mod transport;

pub use transport::{HttpTransport, Transport};

use crate::config::PipelineConfig;
use crate::connectivity::{self, ConnectivityHandle};
use crate::results::{PhaseOutputs, ResultAssembler};
use measure::{MeasurementError, MeasurementResult, Phase, PingStats, Server, SpeedSample};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const EVENT_CAPACITY: usize = 1024;

/// Everything a run reports while it progresses
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    PhaseChanged(Phase),
    /// One successful round trip with the running figures so far
    PingSample {
        attempt: u32,
        rtt_ms: f64,
        ping_ms: f64,
        jitter_ms: f64,
    },
    PingFinished {
        ping_ms: f64,
        jitter_ms: f64,
        packet_loss_pct: f64,
    },
    /// Running throughput after a completed chunk
    Throughput {
        phase: Phase,
        sample: SpeedSample,
        elapsed: Duration,
        total_bytes: u64,
    },
    ThroughputFinished {
        phase: Phase,
        mbps: f64,
    },
    /// Cosmetic decay of the last speed after the final phase
    Settling {
        mbps: f64,
    },
    /// Always the last event of a successful run
    Completed(Arc<MeasurementResult>),
    Failed(MeasurementError),
}

/// Current phase, plus the error that reset the pipeline if any
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStatus {
    pub phase: Phase,
    pub error: Option<MeasurementError>,
}

impl PipelineStatus {
    fn failed(error: MeasurementError) -> Self {
        Self {
            phase: Phase::Idle,
            error: Some(error),
        }
    }
}

/// State shared by the phases of one run
pub(crate) struct RunContext {
    pub transport: Arc<dyn Transport>,
    pub config: PipelineConfig,
    pub host: String,
    pub cancel: CancellationToken,
    /// Cancelled by the connectivity watcher when the link drops
    pub lost: CancellationToken,
    events: broadcast::Sender<PipelineEvent>,
    status: Arc<watch::Sender<PipelineStatus>>,
}

impl RunContext {
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.events.send(event);
    }

    fn enter(&self, phase: Phase) {
        info!("Entering {} phase", phase);
        self.status.send_replace(PipelineStatus { phase, error: None });
        self.emit(PipelineEvent::PhaseChanged(phase));
    }

    /// Run `fut` unless the run is cancelled or the link is lost first
    pub async fn guarded<F: Future>(&self, fut: F) -> Result<F::Output, MeasurementError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(MeasurementError::Aborted),
            _ = self.lost.cancelled() => Err(MeasurementError::NoConnectivity),
            output = fut => Ok(output),
        }
    }

    pub async fn sleep(&self, duration: Duration) -> Result<(), MeasurementError> {
        self.guarded(tokio::time::sleep(duration)).await
    }
}

/// Handle to an active run
pub struct RunHandle {
    cancel: CancellationToken,
    join: JoinHandle<Result<Arc<MeasurementResult>, MeasurementError>>,
}

impl RunHandle {
    /// Abort the run; in-flight probes are dropped, not awaited
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn wait(self) -> Result<Arc<MeasurementResult>, MeasurementError> {
        self.join
            .await
            .unwrap_or_else(|_| Err(MeasurementError::Aborted))
    }
}

pub struct MeasurementPipeline {
    transport: Arc<dyn Transport>,
    connectivity: ConnectivityHandle,
    assembler: Arc<ResultAssembler>,
    config: PipelineConfig,
    events: broadcast::Sender<PipelineEvent>,
    status: Arc<watch::Sender<PipelineStatus>>,
    running: Arc<AtomicBool>,
}

impl MeasurementPipeline {
    pub fn new(
        transport: Arc<dyn Transport>,
        connectivity: ConnectivityHandle,
        assembler: ResultAssembler,
        config: PipelineConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (status, _) = watch::channel(PipelineStatus::default());
        Self {
            transport,
            connectivity,
            assembler: Arc::new(assembler),
            config,
            events,
            status: Arc::new(status),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> PipelineStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<PipelineStatus> {
        self.status.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start a run against `server`
    ///
    /// Missing server or connectivity fail immediately, before any phase.
    pub fn start(&self, server: Option<&Server>) -> Result<RunHandle, MeasurementError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(MeasurementError::AlreadyRunning);
        }

        let Some(server) = server.cloned() else {
            return Err(self.reject(MeasurementError::NoServerSelected));
        };
        if !self.connectivity.is_connected() {
            return Err(self.reject(MeasurementError::NoConnectivity));
        }

        info!("Starting measurement against {} ({})", server.name, server.host);

        let cancel = CancellationToken::new();
        let ctx = RunContext {
            transport: self.transport.clone(),
            config: self.config.clone(),
            host: server.host.clone(),
            cancel: cancel.clone(),
            lost: CancellationToken::new(),
            events: self.events.clone(),
            status: self.status.clone(),
        };
        ctx.enter(Phase::Connecting);

        let join = tokio::spawn(run(
            ctx,
            server,
            self.assembler.clone(),
            self.running.clone(),
            self.connectivity.clone(),
        ));

        Ok(RunHandle { cancel, join })
    }

    fn reject(&self, err: MeasurementError) -> MeasurementError {
        warn!("Measurement not started: {}", err);
        self.status.send_replace(PipelineStatus::failed(err.clone()));
        self.running.store(false, Ordering::Release);
        let _ = self.events.send(PipelineEvent::Failed(err.clone()));
        err
    }
}

async fn run(
    ctx: RunContext,
    server: Server,
    assembler: Arc<ResultAssembler>,
    running: Arc<AtomicBool>,
    connectivity: ConnectivityHandle,
) -> Result<Arc<MeasurementResult>, MeasurementError> {
    let done = CancellationToken::new();
    let _stop_watcher = done.clone().drop_guard();
    let lost = ctx.lost.clone();
    let link = connectivity.subscribe();
    tokio::spawn(async move {
        tokio::select! {
            _ = done.cancelled() => {}
            _ = connectivity::wait_for_disconnect(link) => {
                warn!("Connectivity lost during measurement");
                lost.cancel();
            }
        }
    });

    let outcome = execute(&ctx, &server, &assembler).await;

    // Status must be final before the flag clears; the next `start` may follow at once
    match outcome {
        Ok(result) => {
            info!(
                "Measurement complete: down {:.2} Mbit/s, up {:.2} Mbit/s, ping {}ms",
                result.download_mbps, result.upload_mbps, result.ping_ms
            );
            running.store(false, Ordering::Release);
            ctx.emit(PipelineEvent::Completed(result.clone()));
            Ok(result)
        }
        Err(err) => {
            warn!("Measurement failed: {}", err);
            ctx.status.send_replace(PipelineStatus::failed(err.clone()));
            running.store(false, Ordering::Release);
            ctx.emit(PipelineEvent::Failed(err.clone()));
            Err(err)
        }
    }
}

async fn execute(
    ctx: &RunContext,
    server: &Server,
    assembler: &ResultAssembler,
) -> Result<Arc<MeasurementResult>, MeasurementError> {
    ctx.sleep(ctx.config.settle())
        .await
        .map_err(|e| ping::unreachable_without_samples(e, &PingStats::default()))?;

    ctx.enter(Phase::Ping);
    let ping = ping::run(ctx).await?;

    ctx.enter(Phase::Download);
    let download = throughput::download(ctx).await?;

    ctx.enter(Phase::Upload);
    let upload = throughput::upload(ctx).await?;

    ctx.enter(Phase::Complete);
    throughput::decay(ctx, upload.mbps).await?;

    let outputs = PhaseOutputs {
        ping,
        download_mbps: download.mbps,
        download_history: download.history.to_vec(),
        upload_mbps: upload.mbps,
        upload_history: upload.history.to_vec(),
    };

    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => Err(MeasurementError::Aborted),
        result = assembler.finish(outputs, server) => Ok(result),
    }
}
