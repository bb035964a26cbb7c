//! Download and upload phases, plus the closing speed decay

use super::{PipelineEvent, RunContext};
use futures::stream::{FuturesUnordered, StreamExt};
use measure::{MeasurementError, Phase, ProbeError, SampleHistory, throughput_mbps};
use rand::Rng;
use rand::seq::SliceRandom;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Final throughput of a phase and its recent samples
#[derive(Debug, Clone)]
pub(crate) struct ThroughputSummary {
    pub mbps: f64,
    pub history: SampleHistory,
}

/// Running byte count and sample history of one phase
struct Meter {
    phase: Phase,
    started: Instant,
    total_bytes: u64,
    history: SampleHistory,
}

impl Meter {
    fn new(phase: Phase, capacity: usize) -> Self {
        Self {
            phase,
            started: Instant::now(),
            total_bytes: 0,
            history: SampleHistory::new(capacity),
        }
    }

    fn mbps(&self) -> f64 {
        throughput_mbps(self.total_bytes, self.started.elapsed().as_secs_f64())
    }

    fn record(&mut self, ctx: &RunContext, bytes: u64) {
        self.total_bytes += bytes;
        let sample = self.history.push(self.mbps());
        ctx.emit(PipelineEvent::Throughput {
            phase: self.phase,
            sample,
            elapsed: self.started.elapsed(),
            total_bytes: self.total_bytes,
        });
    }

    fn finish(self, ctx: &RunContext) -> ThroughputSummary {
        let mbps = self.mbps();
        info!(
            "{} finished: {:.2} Mbit/s ({} bytes in {:.1}s)",
            self.phase,
            mbps,
            self.total_bytes,
            self.started.elapsed().as_secs_f64()
        );
        ctx.emit(PipelineEvent::ThroughputFinished {
            phase: self.phase,
            mbps,
        });
        ThroughputSummary {
            mbps,
            history: self.history,
        }
    }
}

fn log_probe_failure(phase: Phase, err: ProbeError) {
    let timed_out = err == ProbeError::Timeout;
    let err = MeasurementError::from(err);
    if timed_out {
        warn!("{} probe dropped: {}", phase, err);
    } else {
        debug!("{} probe dropped: {}", phase, err);
    }
}

/// Concurrent chunk downloads until the time budget runs out
///
/// In-flight chunks are drained after the deadline and still count.
pub(crate) async fn download(ctx: &RunContext) -> Result<ThroughputSummary, MeasurementError> {
    let config = &ctx.config;
    let mut meter = Meter::new(Phase::Download, config.history_capacity);
    let deadline = meter.started + config.download_duration();
    let retry_delay = Duration::from_millis(measure::PROBE_RETRY_DELAY_MS);

    let mut in_flight = FuturesUnordered::new();
    let mut backoff = false;

    loop {
        while Instant::now() < deadline && in_flight.len() < config.download_concurrency {
            let size = config
                .download_chunk_sizes
                .choose(&mut rand::thread_rng())
                .copied()
                .unwrap_or(measure::MEGABYTE);
            let transport = ctx.transport.clone();
            let host = ctx.host.clone();
            let timeout = config.download_timeout();
            let delay = backoff.then_some(retry_delay);
            backoff = false;

            in_flight.push(async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                transport.download(&host, size, timeout).await
            });
        }

        let Some(outcome) = ctx.guarded(in_flight.next()).await? else {
            break;
        };

        match outcome {
            Ok(bytes) => meter.record(ctx, bytes),
            Err(e) => {
                log_probe_failure(Phase::Download, e);
                backoff = true;
            }
        }
    }

    Ok(meter.finish(ctx))
}

/// Sequential fixed-size uploads until the time budget runs out
///
/// Too many failures in a row are treated as a lost link.
pub(crate) async fn upload(ctx: &RunContext) -> Result<ThroughputSummary, MeasurementError> {
    let config = &ctx.config;
    let mut meter = Meter::new(Phase::Upload, config.history_capacity);
    let deadline = meter.started + config.upload_duration();
    let retry_delay = Duration::from_millis(measure::PROBE_RETRY_DELAY_MS);

    let mut payload = vec![0u8; config.upload_chunk_size as usize];
    rand::thread_rng().fill(&mut payload[..]);

    let mut consecutive_failures = 0u32;
    while Instant::now() < deadline {
        let outcome = ctx
            .guarded(
                ctx.transport
                    .upload(&ctx.host, &payload, config.upload_timeout()),
            )
            .await?;

        match outcome {
            Ok(bytes) => {
                consecutive_failures = 0;
                meter.record(ctx, bytes);
            }
            Err(e) => {
                consecutive_failures += 1;
                log_probe_failure(Phase::Upload, e);
                if consecutive_failures >= config.upload_failure_limit {
                    warn!(
                        "{} consecutive upload failures, giving up",
                        consecutive_failures
                    );
                    return Err(MeasurementError::NoConnectivity);
                }
                ctx.sleep(retry_delay).await?;
            }
        }
    }

    Ok(meter.finish(ctx))
}

/// Ease the last shown speed down to zero
///
/// Presentation only; just cancellation can interrupt it.
pub(crate) async fn decay(ctx: &RunContext, from_mbps: f64) -> Result<(), MeasurementError> {
    let steps = ctx.config.decay_steps;
    if steps == 0 {
        return Ok(());
    }
    let step = ctx.config.decay() / steps;

    for i in 1..=steps {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(MeasurementError::Aborted),
            _ = tokio::time::sleep(step) => {}
        }
        let remaining = 1.0 - f64::from(i) / f64::from(steps);
        ctx.emit(PipelineEvent::Settling {
            mbps: from_mbps * remaining,
        });
    }
    Ok(())
}
