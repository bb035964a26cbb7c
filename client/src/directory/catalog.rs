//! Remote server catalog and the built-in fallback list

use anyhow::{Context, Result};
use async_trait::async_trait;
use measure::Server;
use std::time::Duration;
use tracing::debug;

/// Source of candidate servers
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Server>>;
}

/// Catalog served as a JSON array over HTTP
pub struct HttpCatalog {
    client: reqwest::Client,
    url: String,
}

impl HttpCatalog {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Catalog for HttpCatalog {
    async fn fetch(&self) -> Result<Vec<Server>> {
        debug!("Fetching server catalog from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("Failed to query server catalog")?;

        if !response.status().is_success() {
            anyhow::bail!("Server catalog returned error: {}", response.status());
        }

        let body = response
            .text()
            .await
            .context("Failed to read server catalog")?;

        let servers = measure::server::parse_catalog(&body).context("Malformed server catalog")?;
        debug!("Catalog returned {} usable servers", servers.len());
        Ok(servers)
    }
}

/// Built-in servers used whenever the catalog cannot be reached
///
/// The first entry is the designated default.
pub fn fallback_servers() -> Vec<Server> {
    vec![
        Server::new("cloudflare", "Cloudflare", "speed.cloudflare.com", "Cloudflare")
            .with_location("Global", "Worldwide", "WW")
            .as_default(),
        Server::new("fast", "Fast.com", "fast.com", "Netflix")
            .with_location("Global", "Worldwide", "WW"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_fallback_has_single_default() {
        let servers = fallback_servers();
        assert!(!servers.is_empty());
        assert_eq!(servers.iter().filter(|s| s.is_default).count(), 1);
        assert!(servers[0].is_default);
    }

    #[tokio::test]
    async fn test_http_catalog_parses_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/servers"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"id": 1, "host": "a.example", "sponsor": "Alpha", "name": "Minsk",
                     "country": "Belarus", "cc": "BY", "lat": "53.9", "lon": "27.56"}]"#,
            ))
            .mount(&server)
            .await;

        let catalog =
            HttpCatalog::new(&format!("{}/servers", server.uri()), Duration::from_secs(2)).unwrap();
        let servers = catalog.fetch().await.unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].host, "a.example");
    }

    #[tokio::test]
    async fn test_http_catalog_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let catalog = HttpCatalog::new(&server.uri(), Duration::from_secs(2)).unwrap();
        assert!(catalog.fetch().await.is_err());
    }
}
