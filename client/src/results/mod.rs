//! Result assembly
//!
//! Packages phase outputs and connection metadata into a
//! [`MeasurementResult`] and hands it to the persistence collaborator.

use crate::connectivity::{ConnectivityHandle, InterfaceType};
use crate::network_monitor::NetworkDetails;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use measure::{MeasurementResult, NOT_AVAILABLE, PingStats, Server, SpeedSample};
use std::sync::Arc;
use tracing::{debug, warn};

/// Durable storage for finished results
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn store(&self, result: &MeasurementResult) -> anyhow::Result<()>;
}

/// Device and connection details captured when a run completes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionMetadata {
    pub connection_type: String,
    pub provider_name: String,
    pub internal_ip: String,
    pub external_ip: String,
}

impl ConnectionMetadata {
    pub fn unavailable(interface: InterfaceType) -> Self {
        Self {
            connection_type: interface.label().to_string(),
            provider_name: interface.fallback_provider().to_string(),
            internal_ip: NOT_AVAILABLE.to_string(),
            external_ip: NOT_AVAILABLE.to_string(),
        }
    }
}

/// Everything the measurement phases produced
#[derive(Debug, Clone, Default)]
pub struct PhaseOutputs {
    pub ping: PingStats,
    pub download_mbps: f64,
    pub download_history: Vec<SpeedSample>,
    pub upload_mbps: f64,
    pub upload_history: Vec<SpeedSample>,
}

/// Build the immutable record; ping figures are truncated for display
pub fn assemble(
    outputs: PhaseOutputs,
    server: &Server,
    metadata: ConnectionMetadata,
    completed_at: DateTime<Utc>,
) -> MeasurementResult {
    MeasurementResult {
        download_mbps: outputs.download_mbps,
        upload_mbps: outputs.upload_mbps,
        download_history: outputs.download_history,
        upload_history: outputs.upload_history,
        ping_ms: outputs.ping.ping_ms() as u32,
        jitter_ms: outputs.ping.jitter_ms() as u32,
        packet_loss_pct: outputs.ping.packet_loss_pct() as u32,
        server_name: server.name.clone(),
        server_location: server.location_label(),
        connection_type: metadata.connection_type,
        provider_name: metadata.provider_name,
        internal_ip: metadata.internal_ip,
        external_ip: metadata.external_ip,
        completed_at,
    }
}

pub struct ResultAssembler {
    connectivity: ConnectivityHandle,
    details: Arc<dyn NetworkDetails>,
    sink: Option<Arc<dyn ResultSink>>,
}

impl ResultAssembler {
    pub fn new(
        connectivity: ConnectivityHandle,
        details: Arc<dyn NetworkDetails>,
        sink: Option<Arc<dyn ResultSink>>,
    ) -> Self {
        Self {
            connectivity,
            details,
            sink,
        }
    }

    /// Resolve connection metadata; lookups that fail fall back to labels
    pub async fn metadata(&self) -> ConnectionMetadata {
        let interface = self.connectivity.current().interface;
        let (provider, internal, external) = tokio::join!(
            self.details.provider_name(interface),
            self.details.internal_ip(),
            self.details.external_ip(),
        );

        let mut metadata = ConnectionMetadata::unavailable(interface);
        if let Some(provider) = provider.filter(|p| !p.trim().is_empty()) {
            metadata.provider_name = provider;
        }
        if let Some(ip) = internal {
            metadata.internal_ip = ip.to_string();
        }
        if let Some(ip) = external {
            metadata.external_ip = ip.to_string();
        }
        metadata
    }

    /// Assemble the result and pass it to the sink
    ///
    /// A sink failure is logged; the result is still returned.
    pub async fn finish(&self, outputs: PhaseOutputs, server: &Server) -> Arc<MeasurementResult> {
        let metadata = self.metadata().await;
        let result = Arc::new(assemble(outputs, server, metadata, Utc::now()));

        if let Some(sink) = &self.sink {
            match sink.store(&result).await {
                Ok(()) => debug!("Stored result for {}", result.server_name),
                Err(e) => warn!("Failed to store measurement result: {:#}", e),
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::{ConnectivityMonitor, ConnectivityState};
    use std::net::IpAddr;
    use std::sync::Mutex;

    struct FixedDetails {
        provider: Option<String>,
        external: Option<IpAddr>,
    }

    #[async_trait]
    impl NetworkDetails for FixedDetails {
        async fn provider_name(&self, _interface: InterfaceType) -> Option<String> {
            self.provider.clone()
        }

        async fn internal_ip(&self) -> Option<IpAddr> {
            None
        }

        async fn external_ip(&self) -> Option<IpAddr> {
            self.external
        }
    }

    #[derive(Default)]
    struct MemorySink {
        stored: Mutex<Vec<MeasurementResult>>,
    }

    #[async_trait]
    impl ResultSink for MemorySink {
        async fn store(&self, result: &MeasurementResult) -> anyhow::Result<()> {
            self.stored.lock().unwrap().push(result.clone());
            Ok(())
        }
    }

    fn outputs() -> PhaseOutputs {
        let mut ping = PingStats::default();
        for rtt in [10.0, 20.0, 15.0] {
            ping.record_success(rtt);
        }
        ping.record_failure();

        PhaseOutputs {
            ping,
            download_mbps: 84.2,
            download_history: vec![SpeedSample { index: 0, mbps: 84.2 }],
            upload_mbps: 21.7,
            upload_history: vec![SpeedSample { index: 0, mbps: 21.7 }],
        }
    }

    #[test]
    fn test_assemble_truncates_ping_figures() {
        let server = Server::new("2", "ByFly", "speedtest.byfly.by", "Beltelecom")
            .with_location("Minsk", "Belarus", "BY");
        let result = assemble(
            outputs(),
            &server,
            ConnectionMetadata::unavailable(InterfaceType::Wired),
            Utc::now(),
        );

        assert_eq!(result.ping_ms, 15);
        assert_eq!(result.jitter_ms, 7);
        assert_eq!(result.packet_loss_pct, 25);
        assert_eq!(result.server_name, "ByFly");
        assert_eq!(result.server_location, "Minsk, Belarus");
        assert_eq!(result.connection_type, "Ethernet");
        assert_eq!(result.internal_ip, "N/A");
    }

    #[tokio::test]
    async fn test_finish_fills_metadata_and_stores() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::online(InterfaceType::Wifi));
        let sink = Arc::new(MemorySink::default());
        let assembler = ResultAssembler::new(
            monitor.handle(),
            Arc::new(FixedDetails {
                provider: None,
                external: Some("203.0.113.7".parse().unwrap()),
            }),
            Some(sink.clone()),
        );

        let server = Server::new("cloudflare", "Cloudflare", "speed.cloudflare.com", "Cloudflare");
        let result = assembler.finish(outputs(), &server).await;

        assert_eq!(result.connection_type, "Wi-Fi");
        assert_eq!(result.provider_name, "Wi-Fi Network");
        assert_eq!(result.internal_ip, "N/A");
        assert_eq!(result.external_ip, "203.0.113.7");

        let stored = sink.stored.lock().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0], *result);
    }

    #[tokio::test]
    async fn test_provider_name_from_details() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::online(InterfaceType::Wifi));
        let assembler = ResultAssembler::new(
            monitor.handle(),
            Arc::new(FixedDetails {
                provider: Some("HomeNet".to_string()),
                external: None,
            }),
            None,
        );

        let metadata = assembler.metadata().await;
        assert_eq!(metadata.provider_name, "HomeNet");
        assert_eq!(metadata.external_ip, "N/A");
    }
}
