//! Console output and CSV export

use crate::testing::PipelineEvent;
use anyhow::Result;
use crossterm::{
    cursor::MoveToColumn,
    queue,
    style::Print,
    terminal::{Clear, ClearType},
};
use measure::units::format_speed;
use measure::{DialScale, DisplayUnit, MeasurementResult, Phase, Server};
use std::io::Write;
use std::path::Path;

const GAUGE_WIDTH: usize = 30;

/// Text gauge for a `[0, 1]` needle position
pub fn gauge_bar(fraction: f64, width: usize) -> String {
    let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
    let filled = (fraction * width as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(width - filled))
}

fn stars(rating: u8) -> String {
    let rating = rating.min(5) as usize;
    format!("{}{}", "*".repeat(rating), "-".repeat(5 - rating))
}

/// Draws pipeline events as they arrive, redrawing the current line in place
pub struct ConsoleRenderer<W: Write> {
    out: W,
    unit: DisplayUnit,
    scale: DialScale,
}

impl<W: Write> ConsoleRenderer<W> {
    pub fn new(out: W, unit: DisplayUnit, scale: DialScale) -> Self {
        Self { out, unit, scale }
    }

    fn redraw(&mut self, line: &str) -> Result<()> {
        queue!(
            self.out,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(line)
        )?;
        self.out.flush()?;
        Ok(())
    }

    fn finish_line(&mut self, line: &str) -> Result<()> {
        self.redraw(line)?;
        writeln!(self.out)?;
        Ok(())
    }

    fn speed_line(&self, label: &str, mbps: f64) -> String {
        let needle = self.scale.progress(self.unit.dial_speed(mbps, self.scale));
        format!(
            "  {:<9} {} {}",
            label,
            gauge_bar(needle, GAUGE_WIDTH),
            format_speed(mbps, self.unit)
        )
    }

    fn scale_legend(&self) -> String {
        self.scale
            .marks()
            .iter()
            .map(|(value, _)| value.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn render(&mut self, event: &PipelineEvent) -> Result<()> {
        match event {
            PipelineEvent::PhaseChanged(Phase::Connecting) => {
                writeln!(self.out, "Connecting...")?;
                writeln!(self.out, "  Scale     {} ({})", self.scale_legend(), self.unit)?;
            }
            PipelineEvent::PhaseChanged(_) => {}
            PipelineEvent::PingSample {
                attempt,
                ping_ms,
                jitter_ms,
                ..
            } => {
                let line = format!(
                    "  Ping      {:.0} ms  jitter {:.0} ms  ({})",
                    ping_ms, jitter_ms, attempt
                );
                self.redraw(&line)?;
            }
            PipelineEvent::PingFinished {
                ping_ms,
                jitter_ms,
                packet_loss_pct,
            } => {
                let line = format!(
                    "  Ping      {:.0} ms  jitter {:.0} ms  loss {:.0}%",
                    ping_ms, jitter_ms, packet_loss_pct
                );
                self.finish_line(&line)?;
            }
            PipelineEvent::Throughput { phase, sample, .. } => {
                let line = self.speed_line(phase.label(), sample.mbps);
                self.redraw(&line)?;
            }
            PipelineEvent::ThroughputFinished { phase, mbps } => {
                let line = self.speed_line(phase.label(), *mbps);
                self.finish_line(&line)?;
            }
            PipelineEvent::Settling { .. } => {}
            PipelineEvent::Completed(result) => {
                writeln!(self.out)?;
                print_result(&mut self.out, result, self.unit)?;
            }
            PipelineEvent::Failed(err) => {
                writeln!(self.out)?;
                writeln!(self.out, "Measurement failed: {}", err)?;
            }
        }
        Ok(())
    }
}

/// Summary of one finished measurement with its ratings
pub fn print_result<W: Write>(out: &mut W, result: &MeasurementResult, unit: DisplayUnit) -> Result<()> {
    writeln!(out, "Download:    {}", format_speed(result.download_mbps, unit))?;
    writeln!(out, "Upload:      {}", format_speed(result.upload_mbps, unit))?;
    writeln!(out, "Bandwidth:   {}", format_speed(result.bandwidth_mbps(), unit))?;
    writeln!(
        out,
        "Ping:        {} ms (jitter {} ms, loss {}%)",
        result.ping_ms, result.jitter_ms, result.packet_loss_pct
    )?;
    writeln!(out, "Server:      {} ({})", result.server_name, result.server_location)?;
    writeln!(
        out,
        "Connection:  {} via {}",
        result.connection_type, result.provider_name
    )?;
    writeln!(
        out,
        "Addresses:   internal {}, external {}",
        result.internal_ip, result.external_ip
    )?;
    writeln!(out, "Streaming:   {}", stars(result.streaming_rating()))?;
    writeln!(out, "Gaming:      {}", stars(result.gaming_rating()))?;
    writeln!(out, "Uploading:   {}", stars(result.uploading_rating()))?;
    Ok(())
}

pub fn print_servers<W: Write>(out: &mut W, servers: &[Server], selected: Option<&Server>) -> Result<()> {
    if servers.is_empty() {
        writeln!(out, "No servers found")?;
        return Ok(());
    }

    for server in servers {
        let marker = match selected {
            Some(s) if s.id == server.id => '*',
            _ => ' ',
        };
        writeln!(
            out,
            "{} {:<12} {:<28} {:<28} {:>8.0} km",
            marker,
            server.id,
            server.name,
            server.location_label(),
            server.distance_km
        )?;
    }
    Ok(())
}

pub fn print_history<W: Write>(out: &mut W, results: &[MeasurementResult], unit: DisplayUnit) -> Result<()> {
    if results.is_empty() {
        writeln!(out, "No stored results")?;
        return Ok(());
    }

    for result in results {
        writeln!(
            out,
            "{}  down {:>14}  up {:>14}  ping {:>4} ms  {}",
            result
                .completed_at
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M"),
            format_speed(result.download_mbps, unit),
            format_speed(result.upload_mbps, unit),
            result.ping_ms,
            result.server_name
        )?;
    }
    Ok(())
}

/// Export stored results as CSV
pub fn export_csv(results: &[MeasurementResult], output_path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(output_path)?;

    writer.write_record([
        "completed_at",
        "download_mbps",
        "upload_mbps",
        "ping_ms",
        "jitter_ms",
        "packet_loss_pct",
        "server_name",
        "server_location",
        "connection_type",
        "provider_name",
        "internal_ip",
        "external_ip",
    ])?;

    for r in results {
        writer.write_record(&[
            r.completed_at.to_rfc3339(),
            format!("{:.2}", r.download_mbps),
            format!("{:.2}", r.upload_mbps),
            r.ping_ms.to_string(),
            r.jitter_ms.to_string(),
            r.packet_loss_pct.to_string(),
            r.server_name.clone(),
            r.server_location.clone(),
            r.connection_type.clone(),
            r.provider_name.clone(),
            r.internal_ip.clone(),
            r.external_ip.clone(),
        ])?;
    }

    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use measure::{MeasurementError, SpeedSample};
    use std::sync::Arc;

    fn result() -> MeasurementResult {
        MeasurementResult {
            download_mbps: 100.0,
            upload_mbps: 20.0,
            download_history: Vec::new(),
            upload_history: Vec::new(),
            ping_ms: 25,
            jitter_ms: 4,
            packet_loss_pct: 0,
            server_name: "ByFly".to_string(),
            server_location: "Minsk, Belarus".to_string(),
            connection_type: "Wi-Fi".to_string(),
            provider_name: "HomeNet".to_string(),
            internal_ip: "192.168.1.20".to_string(),
            external_ip: "N/A".to_string(),
            completed_at: Utc::now(),
        }
    }

    fn rendered(events: &[PipelineEvent], unit: DisplayUnit) -> String {
        let mut renderer = ConsoleRenderer::new(Vec::new(), unit, DialScale::Scale100);
        for event in events {
            renderer.render(event).unwrap();
        }
        String::from_utf8(renderer.out).unwrap()
    }

    #[test]
    fn test_gauge_bar() {
        assert_eq!(gauge_bar(0.0, 4), "[....]");
        assert_eq!(gauge_bar(0.5, 4), "[##..]");
        assert_eq!(gauge_bar(1.7, 4), "[####]");
        assert_eq!(gauge_bar(f64::NAN, 2), "[..]");
    }

    #[test]
    fn test_render_throughput_in_unit() {
        let out = rendered(
            &[
                PipelineEvent::PhaseChanged(Phase::Connecting),
                PipelineEvent::Throughput {
                    phase: Phase::Download,
                    sample: SpeedSample { index: 0, mbps: 16.0 },
                    elapsed: std::time::Duration::from_secs(1),
                    total_bytes: 2_000_000,
                },
                PipelineEvent::ThroughputFinished {
                    phase: Phase::Download,
                    mbps: 16.0,
                },
            ],
            DisplayUnit::Mbyte,
        );
        assert!(out.contains("Connecting..."));
        assert!(out.contains("Scale     0 1 5 10 20 30 50 75 100 (MB/s)"));
        assert!(out.contains("Download"));
        assert!(out.contains("2.00 MB/s"));
    }

    #[test]
    fn test_render_completion_and_failure() {
        let out = rendered(
            &[PipelineEvent::Completed(Arc::new(result()))],
            DisplayUnit::Mbit,
        );
        assert!(out.contains("Download:    100.00 Mbit/s"));
        assert!(out.contains("Bandwidth:   60.00 Mbit/s"));
        assert!(out.contains("Streaming:   *****"));

        let out = rendered(
            &[PipelineEvent::Failed(MeasurementError::ServerUnreachable)],
            DisplayUnit::Mbit,
        );
        assert!(out.contains("Measurement failed: Server is unreachable"));
    }

    #[test]
    fn test_print_servers_marks_selection() {
        let servers = vec![
            Server::new("1", "Cloudflare", "speed.cloudflare.com", "Cloudflare"),
            Server::new("2", "ByFly", "speedtest.byfly.by", "Beltelecom"),
        ];
        let mut out = Vec::new();
        print_servers(&mut out, &servers, Some(&servers[1])).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("  1"));
        assert!(lines[1].starts_with("* 2"));
    }

    #[test]
    fn test_export_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        export_csv(&[result(), result()], &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("completed_at,download_mbps"));
        assert!(lines[1].contains("100.00,20.00,25,4,0,ByFly"));
    }
}
