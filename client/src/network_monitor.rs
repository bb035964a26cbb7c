//! Network details - default route, local and public addresses, provider name
//!
//! Everything here is best-effort: lookups that fail are logged and
//! reported as `None`, never as errors to the measurement run.

use crate::connectivity::InterfaceType;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::net::{IpAddr, UdpSocket};
use std::process::Command;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Gateway and outgoing interface of the default route
///
/// Point-to-point links (cellular modems, PPP, WireGuard) route by device
/// only and have no gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultRoute {
    pub gateway: Option<IpAddr>,
    pub interface: Option<String>,
}

/// Detect the default route using `ip route` command
pub fn detect_default_route() -> Result<DefaultRoute> {
    let output = Command::new("ip")
        .args(["route", "show", "default"])
        .output()
        .context("Failed to execute 'ip route' command")?;

    if !output.status.success() {
        anyhow::bail!("Failed to get default route");
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    debug!("Default route output: {}", stdout);

    parse_default_route(&stdout)
        .ok_or_else(|| anyhow::anyhow!("Could not parse default route from 'ip route' output"))
}

/// Parse output like: "default via 192.168.1.1 dev eth0 proto dhcp metric 100"
/// or "default dev wwan0 proto static scope link"
pub fn parse_default_route(output: &str) -> Option<DefaultRoute> {
    for line in output.lines() {
        if !line.starts_with("default") {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        let gateway = parts
            .iter()
            .position(|&p| p == "via")
            .and_then(|idx| parts.get(idx + 1))
            .and_then(|s| IpAddr::from_str(s).ok());
        let interface = parts
            .iter()
            .position(|&p| p == "dev")
            .and_then(|idx| parts.get(idx + 1))
            .map(|s| s.to_string());

        if gateway.is_some() || interface.is_some() {
            return Some(DefaultRoute { gateway, interface });
        }
    }
    None
}

/// Local address the OS would use for outgoing traffic
///
/// Connecting a UDP socket only selects a route, no packet is sent.
pub fn detect_internal_ip() -> Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").context("Failed to bind UDP socket")?;
    socket
        .connect("1.1.1.1:80")
        .context("No route for outgoing traffic")?;
    let addr = socket.local_addr().context("Failed to read local address")?;
    Ok(addr.ip())
}

/// Get public IP address from external service
pub async fn get_public_ip(client: &reqwest::Client, service_url: &str) -> Result<IpAddr> {
    debug!("Querying public IP from: {}", service_url);

    let response = client
        .get(service_url)
        .send()
        .await
        .context("Failed to query public IP service")?;

    if !response.status().is_success() {
        anyhow::bail!("Public IP service returned error: {}", response.status());
    }

    let ip_str = response
        .text()
        .await
        .context("Failed to read public IP response")?
        .trim()
        .to_string();

    let ip = IpAddr::from_str(&ip_str).context("Failed to parse public IP address")?;

    debug!("Detected public IP: {}", ip);
    Ok(ip)
}

/// SSID of the current wifi network via `iwgetid`
fn detect_wifi_ssid() -> Option<String> {
    let output = Command::new("iwgetid").arg("-r").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let ssid = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if ssid.is_empty() { None } else { Some(ssid) }
}

/// Operator name of the first modem known to ModemManager
fn detect_carrier_name() -> Option<String> {
    let output = Command::new("mmcli")
        .args(["--modem", "any", "--output-keyvalue"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_operator_name(&String::from_utf8_lossy(&output.stdout))
}

/// Pick `modem.3gpp.operator-name` out of `mmcli --output-keyvalue`
pub fn parse_operator_name(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim() != "modem.3gpp.operator-name" {
            return None;
        }
        let value = value.trim();
        // mmcli prints "--" for unset values
        if value.is_empty() || value == "--" {
            None
        } else {
            Some(value.to_string())
        }
    })
}

/// Source of the metadata attached to a finished measurement
#[async_trait]
pub trait NetworkDetails: Send + Sync {
    /// Carrier or SSID for the active interface, if it can be found
    async fn provider_name(&self, interface: InterfaceType) -> Option<String>;

    async fn internal_ip(&self) -> Option<IpAddr>;

    async fn external_ip(&self) -> Option<IpAddr>;
}

/// [`NetworkDetails`] backed by the local system and a public IP service
pub struct SystemNetworkDetails {
    client: reqwest::Client,
    public_ip_url: String,
}

impl SystemNetworkDetails {
    pub fn new(public_ip_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(3))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            public_ip_url: public_ip_url.to_string(),
        })
    }
}

#[async_trait]
impl NetworkDetails for SystemNetworkDetails {
    async fn provider_name(&self, interface: InterfaceType) -> Option<String> {
        match interface {
            InterfaceType::Wifi => tokio::task::spawn_blocking(detect_wifi_ssid)
                .await
                .ok()
                .flatten(),
            InterfaceType::Cellular => tokio::task::spawn_blocking(detect_carrier_name)
                .await
                .ok()
                .flatten(),
            _ => None,
        }
    }

    async fn internal_ip(&self) -> Option<IpAddr> {
        match tokio::task::spawn_blocking(detect_internal_ip).await {
            Ok(Ok(ip)) => Some(ip),
            Ok(Err(e)) => {
                warn!("Failed to detect internal IP: {:#}", e);
                None
            }
            Err(e) => {
                warn!("Internal IP lookup task failed: {}", e);
                None
            }
        }
    }

    async fn external_ip(&self) -> Option<IpAddr> {
        match get_public_ip(&self.client, &self.public_ip_url).await {
            Ok(ip) => Some(ip),
            Err(e) => {
                warn!("Failed to check public IP: {:#}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_default_route() {
        let output = "default via 192.168.1.1 dev wlan0 proto dhcp metric 600\n";
        let route = parse_default_route(output).unwrap();
        assert_eq!(route.gateway, Some("192.168.1.1".parse::<IpAddr>().unwrap()));
        assert_eq!(route.interface.as_deref(), Some("wlan0"));

        assert!(parse_default_route("10.0.0.0/8 dev eth0 scope link\n").is_none());
        assert!(parse_default_route("").is_none());
    }

    #[test]
    fn test_parse_default_route_without_gateway() {
        let output = "default dev wwan0 proto static scope link metric 700\n";
        let route = parse_default_route(output).unwrap();
        assert_eq!(route.gateway, None);
        assert_eq!(route.interface.as_deref(), Some("wwan0"));

        let output = "default dev wg0 scope link\ndefault via 10.0.0.1 dev eth0\n";
        assert_eq!(
            parse_default_route(output).unwrap().interface.as_deref(),
            Some("wg0")
        );
    }

    #[test]
    fn test_parse_operator_name() {
        let output = "modem.generic.state                 : connected\n\
                      modem.3gpp.operator-code            : 26201\n\
                      modem.3gpp.operator-name            : Telekom.de\n";
        assert_eq!(parse_operator_name(output).as_deref(), Some("Telekom.de"));

        assert!(parse_operator_name("modem.3gpp.operator-name : --\n").is_none());
        assert!(parse_operator_name("modem.generic.state : idle\n").is_none());
    }

    #[test]
    fn test_detect_default_route() {
        // This test only runs on systems with ip route
        if let Ok(route) = detect_default_route() {
            println!("Detected default route: {:?}", route);
            assert!(route.gateway.is_some() || route.interface.is_some());
        }
    }

    #[tokio::test]
    async fn test_public_ip_from_service() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("203.0.113.7\n"))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let ip = get_public_ip(&client, &server.uri()).await.unwrap();
        assert_eq!(ip, "203.0.113.7".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_public_ip_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let details = SystemNetworkDetails::new(&server.uri()).unwrap();
        assert!(details.external_ip().await.is_none());
    }
}
