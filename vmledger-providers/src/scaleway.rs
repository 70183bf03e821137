use crate::{inventory, CloudProvider};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const API_BASE: &str = "https://api.scaleway.com/instance/v1";
const PAGE_SIZE: usize = 100;

pub struct ScalewayProvider {
    client: Client,
    project_id: String,
    secret_key: String,
    zones: Vec<String>,
}

impl ScalewayProvider {
    pub fn new(project_id: String, secret_key: String, zones: Vec<String>) -> Result<Self> {
        // Default reqwest client has no overall timeout. If Scaleway stalls, a pass can hang forever.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .context("failed to build Scaleway HTTP client")?;
        let zones: Vec<String> = zones
            .into_iter()
            .map(|z| z.trim().to_string())
            .filter(|z| !z.is_empty())
            .collect();
        if zones.is_empty() {
            return Err(anyhow!("Scaleway provider needs at least one zone"));
        }
        Ok(Self {
            client,
            project_id: project_id.trim().to_string(),
            secret_key: secret_key.trim().to_string(),
            zones,
        })
    }

    fn headers(&self) -> Result<reqwest::header::HeaderMap> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "X-Auth-Token",
            reqwest::header::HeaderValue::from_str(&self.secret_key)
                .context("Scaleway secret key is not a valid header value")?,
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        Ok(headers)
    }

    async fn fetch_page(
        &self,
        zone: &str,
        page: usize,
        per_page: usize,
    ) -> Result<(Vec<serde_json::Value>, Option<usize>)> {
        let url = format!("{}/zones/{}/servers", API_BASE, zone);
        let page = page.to_string();
        let per_page = per_page.to_string();
        let resp = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .query(&[
                ("project", self.project_id.as_str()),
                ("page", page.as_str()),
                ("per_page", per_page.as_str()),
            ])
            .send()
            .await
            .with_context(|| format!("Scaleway list servers request failed (zone {})", zone))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Scaleway list servers failed (zone {}): status={} body={}",
                zone,
                status,
                text
            ));
        }

        let total = resp
            .headers()
            .get("x-total-count")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<usize>().ok());

        let json_resp: serde_json::Value = resp.json().await?;
        let servers = json_resp["servers"]
            .as_array()
            .ok_or_else(|| anyhow!("No 'servers' array in response"))?
            .clone();
        Ok((servers, total))
    }

    async fn list_zone(&self, zone: &str) -> Result<Vec<inventory::DiscoveredInstance>> {
        let mut out = Vec::new();
        let mut page = 1;
        loop {
            let (servers, total) = self.fetch_page(zone, page, PAGE_SIZE).await?;
            let returned = servers.len();
            out.extend(servers.iter().filter_map(|s| parse_server(zone, s)));

            let done = match total {
                Some(total) => page * PAGE_SIZE >= total,
                None => returned < PAGE_SIZE,
            };
            if done || returned == 0 {
                break;
            }
            page += 1;
        }
        Ok(out)
    }
}

fn parse_server(zone: &str, server: &serde_json::Value) -> Option<inventory::DiscoveredInstance> {
    let id = server["id"].as_str()?;
    let name = server["name"].as_str()?;
    Some(inventory::DiscoveredInstance {
        provider_id: id.to_string(),
        name: name.to_string(),
        zone: zone.to_string(),
        status: server["state"].as_str().unwrap_or("unknown").to_string(),
        ip_address: server["public_ip"]["address"]
            .as_str()
            .map(|s| s.to_string()),
        created_at: server["creation_date"].as_str().map(|s| s.to_string()),
    })
}

#[async_trait]
impl CloudProvider for ScalewayProvider {
    fn code(&self) -> &str {
        "scaleway"
    }

    async fn check_connection(&self) -> Result<()> {
        // One-item page against the first zone: cheap, and exercises auth.
        self.fetch_page(&self.zones[0], 1, 1).await.map(|_| ())
    }

    async fn list_instances(&self) -> Result<Vec<inventory::DiscoveredInstance>> {
        let mut all = Vec::new();
        for zone in &self.zones {
            let instances = self.list_zone(zone).await?;
            tracing::debug!(zone = %zone, count = instances.len(), "[scaleway] listed servers");
            all.extend(instances);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_server_reads_name_state_and_ip() {
        let server = json!({
            "id": "11111111-2222-3333-4444-555555555555",
            "name": "vm-alpha",
            "state": "running",
            "public_ip": {"address": "51.15.0.10"},
            "creation_date": "2026-01-02T03:04:05Z"
        });
        let inst = parse_server("fr-par-2", &server).unwrap();
        assert_eq!(inst.name, "vm-alpha");
        assert_eq!(inst.status, "running");
        assert_eq!(inst.zone, "fr-par-2");
        assert_eq!(inst.ip_address.as_deref(), Some("51.15.0.10"));
    }

    #[test]
    fn parse_server_skips_entries_without_name() {
        assert!(parse_server("fr-par-2", &json!({"id": "x"})).is_none());
    }

    #[test]
    fn new_requires_a_zone() {
        assert!(ScalewayProvider::new("p".into(), "k".into(), vec![" ".into()]).is_err());
        let p = ScalewayProvider::new("p".into(), "k".into(), vec!["nl-ams-1".into()]).unwrap();
        assert_eq!(p.zones, vec!["nl-ams-1".to_string()]);
        assert_eq!(p.code(), "scaleway");
    }
}
