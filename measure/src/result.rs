//! Ping statistics and the finished measurement record

use crate::sample::SpeedSample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Arithmetic mean of the samples, 0 when empty
pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Mean absolute difference between consecutive samples
///
/// Needs at least two samples, otherwise 0.
pub fn jitter(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let total: f64 = samples.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
    total / (samples.len() - 1) as f64
}

/// Share of attempts that failed, in percent
pub fn packet_loss(attempts: u32, successes: u32) -> f64 {
    if attempts == 0 {
        return 0.0;
    }
    let lost = attempts.saturating_sub(successes);
    (lost as f64 / attempts as f64 * 100.0).clamp(0.0, 100.0)
}

/// Outcome of the ping phase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PingStats {
    /// Successful round trips (ms) in probe order
    pub samples: Vec<f64>,
    pub attempts: u32,
}

impl PingStats {
    pub fn record_success(&mut self, rtt_ms: f64) {
        self.attempts += 1;
        self.samples.push(rtt_ms.max(0.0));
    }

    pub fn record_failure(&mut self) {
        self.attempts += 1;
    }

    pub fn successes(&self) -> u32 {
        self.samples.len() as u32
    }

    /// Running mean of all successful round trips so far
    pub fn ping_ms(&self) -> f64 {
        mean(&self.samples)
    }

    pub fn jitter_ms(&self) -> f64 {
        jitter(&self.samples)
    }

    pub fn packet_loss_pct(&self) -> f64 {
        packet_loss(self.attempts, self.successes())
    }
}

/// Immutable record of one completed measurement run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResult {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub download_history: Vec<SpeedSample>,
    pub upload_history: Vec<SpeedSample>,
    /// Display values, truncated to whole numbers
    pub ping_ms: u32,
    pub jitter_ms: u32,
    pub packet_loss_pct: u32,
    pub server_name: String,
    pub server_location: String,
    pub connection_type: String,
    pub provider_name: String,
    pub internal_ip: String,
    pub external_ip: String,
    pub completed_at: DateTime<Utc>,
}

impl MeasurementResult {
    /// Average of download and upload throughput
    pub fn bandwidth_mbps(&self) -> f64 {
        (self.download_mbps + self.upload_mbps) / 2.0
    }

    /// 1-5 score for video streaming, from download speed
    pub fn streaming_rating(&self) -> u8 {
        match self.download_mbps {
            d if d >= 25.0 => 5,
            d if d >= 15.0 => 4,
            d if d >= 10.0 => 3,
            d if d >= 5.0 => 2,
            _ => 1,
        }
    }

    /// 1-5 score for online gaming, from ping and download speed
    pub fn gaming_rating(&self) -> u8 {
        let ping = self.ping_ms;
        let down = self.download_mbps;
        if ping < 30 && down >= 20.0 {
            5
        } else if ping < 50 && down >= 15.0 {
            4
        } else if ping < 80 && down >= 10.0 {
            3
        } else if ping < 100 {
            2
        } else {
            1
        }
    }

    /// 1-5 score for uploading photos and video, from upload speed
    pub fn uploading_rating(&self) -> u8 {
        match self.upload_mbps {
            u if u >= 10.0 => 5,
            u if u >= 7.0 => 4,
            u if u >= 5.0 => 3,
            u if u >= 3.0 => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(download: f64, upload: f64, ping: u32) -> MeasurementResult {
        MeasurementResult {
            download_mbps: download,
            upload_mbps: upload,
            download_history: Vec::new(),
            upload_history: Vec::new(),
            ping_ms: ping,
            jitter_ms: 0,
            packet_loss_pct: 0,
            server_name: "Test".to_string(),
            server_location: String::new(),
            connection_type: "Wi-Fi".to_string(),
            provider_name: "Unknown".to_string(),
            internal_ip: "N/A".to_string(),
            external_ip: "N/A".to_string(),
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn test_jitter_example() {
        let samples = [10.0, 20.0, 15.0];
        assert_eq!(jitter(&samples), 7.5);
        assert_eq!(jitter(&samples) as u32, 7);
        assert_eq!(jitter(&[12.0]), 0.0);
        assert_eq!(jitter(&[]), 0.0);
    }

    #[test]
    fn test_ping_stats_bounds() {
        let mut stats = PingStats::default();
        stats.record_success(20.0);
        stats.record_failure();
        stats.record_success(30.0);
        stats.record_failure();

        assert_eq!(stats.ping_ms(), 25.0);
        assert_eq!(stats.jitter_ms(), 10.0);
        assert_eq!(stats.packet_loss_pct(), 50.0);

        assert_eq!(packet_loss(0, 0), 0.0);
        assert_eq!(packet_loss(10, 0), 100.0);
        assert_eq!(packet_loss(3, 7), 0.0);
    }

    #[test]
    fn test_negative_rtt_is_clamped() {
        let mut stats = PingStats::default();
        stats.record_success(-3.0);
        assert_eq!(stats.ping_ms(), 0.0);
    }

    #[test]
    fn test_ratings() {
        let fast = result(120.0, 40.0, 12);
        assert_eq!(fast.streaming_rating(), 5);
        assert_eq!(fast.gaming_rating(), 5);
        assert_eq!(fast.uploading_rating(), 5);
        assert_eq!(fast.bandwidth_mbps(), 80.0);

        let slow = result(4.0, 1.0, 140);
        assert_eq!(slow.streaming_rating(), 1);
        assert_eq!(slow.gaming_rating(), 1);
        assert_eq!(slow.uploading_rating(), 1);

        let middling = result(12.0, 6.0, 60);
        assert_eq!(middling.streaming_rating(), 3);
        assert_eq!(middling.gaming_rating(), 3);
        assert_eq!(middling.uploading_rating(), 3);

        // Low ping but slow download only reaches 2
        assert_eq!(result(8.0, 3.0, 20).gaming_rating(), 2);
    }
}
