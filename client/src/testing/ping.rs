//! Ping phase

use super::{PipelineEvent, RunContext};
use measure::{MeasurementError, PingStats, ProbeError};
use tracing::{debug, info};

/// Issue the configured number of round trips against the server
///
/// Running ping and jitter are published after every success; packet loss
/// only once all attempts are done. Fails with `ServerUnreachable` when no
/// attempt succeeded, including when the link drops before the first one.
pub(crate) async fn run(ctx: &RunContext) -> Result<PingStats, MeasurementError> {
    let mut stats = PingStats::default();
    let count = ctx.config.ping_count;
    let timeout = ctx.config.ping_timeout();

    for attempt in 1..=count {
        let probe = tokio::time::timeout(timeout, ctx.transport.ping(&ctx.host, timeout));
        let outcome = match ctx.guarded(probe).await {
            Ok(outcome) => outcome,
            Err(e) => return Err(unreachable_without_samples(e, &stats)),
        };

        match outcome.unwrap_or(Err(ProbeError::Timeout)) {
            Ok(rtt) => {
                let rtt_ms = rtt.as_secs_f64() * 1000.0;
                stats.record_success(rtt_ms);
                debug!("Ping {}/{} -> {:.2}ms", attempt, count, rtt_ms);
                ctx.emit(PipelineEvent::PingSample {
                    attempt,
                    rtt_ms,
                    ping_ms: stats.ping_ms(),
                    jitter_ms: stats.jitter_ms(),
                });
            }
            Err(e) => {
                stats.record_failure();
                let err = MeasurementError::from(e);
                debug!("Ping {}/{} failed: {}", attempt, count, err);
            }
        }

        if attempt < count {
            if let Err(e) = ctx.sleep(ctx.config.ping_interval()).await {
                return Err(unreachable_without_samples(e, &stats));
            }
        }
    }

    if stats.successes() == 0 {
        return Err(MeasurementError::ServerUnreachable);
    }

    info!(
        "Ping finished: {:.1}ms, jitter {:.1}ms, loss {:.0}%",
        stats.ping_ms(),
        stats.jitter_ms(),
        stats.packet_loss_pct()
    );
    ctx.emit(PipelineEvent::PingFinished {
        ping_ms: stats.ping_ms(),
        jitter_ms: stats.jitter_ms(),
        packet_loss_pct: stats.packet_loss_pct(),
    });

    Ok(stats)
}

/// A lost link before any successful round trip means the server was never reached
pub(crate) fn unreachable_without_samples(
    err: MeasurementError,
    stats: &PingStats,
) -> MeasurementError {
    match err {
        MeasurementError::NoConnectivity if stats.successes() == 0 => {
            MeasurementError::ServerUnreachable
        }
        other => other,
    }
}
