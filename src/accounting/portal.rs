//! EGI Accounting Portal client
//!
//! Blocking: a run is strictly sequential, every grid update depends on the
//! previous one.

use super::{parse_records, AccountingQuery, AccountingSource};
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Portal reports can take a few minutes to be computed server side.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub struct AccountingPortalClient {
    client: Client,
    base_url: String,
}

impl AccountingPortalClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .tcp_keepalive(Duration::from_secs(60))
            .default_headers({
                let mut headers = HeaderMap::new();
                headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
                headers
            })
            .build()
            .context("Failed to build AccountingPortalClient")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// `{base}/{scope}/{metric}/REGION/Year/{from}/{to}/custom-{vo}/{local jobs}/{data}/`
    pub fn request_url(&self, query: &AccountingQuery<'_>) -> String {
        format!(
            "{}/{}/{}/REGION/Year/{}/{}/custom-{}/{}/{}/",
            self.base_url,
            query.scope.as_str(),
            query.metric,
            query.window.from(),
            query.window.to(),
            query.entity,
            query.local_job_selector,
            query.data_selector
        )
    }
}

impl AccountingSource for AccountingPortalClient {
    fn fetch(&self, query: &AccountingQuery<'_>) -> Vec<Value> {
        let url = self.request_url(query);
        debug!(vo = query.entity, %url, "requesting accounting records");

        let resp = match self.client.get(&url).send() {
            Ok(resp) => resp,
            Err(e) => {
                warn!(vo = query.entity, error = %e, "accounting portal unreachable");
                return Vec::new();
            }
        };

        if !resp.status().is_success() {
            warn!(
                vo = query.entity,
                status = %resp.status(),
                "accounting portal rejected the request"
            );
            return Vec::new();
        }

        let body = match resp.text() {
            Ok(body) => body,
            Err(e) => {
                warn!(vo = query.entity, error = %e, "failed to read accounting response");
                return Vec::new();
            }
        };

        let records = parse_records(query.entity, &body);
        debug!(vo = query.entity, %url, payload = %body, "accounting payload");
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReportingWindow, Scope};

    fn query(window: ReportingWindow) -> AccountingQuery<'static> {
        AccountingQuery {
            entity: "alpha.example.eu",
            scope: Scope::Htc,
            metric: "sum_elap_processors",
            window,
            local_job_selector: "onlyinfrajobs",
            data_selector: "JSON",
        }
    }

    #[test]
    fn test_request_url_layout() {
        let client =
            AccountingPortalClient::new("https://accounting.example.org/egi/", DEFAULT_TIMEOUT)
                .unwrap();
        let window =
            ReportingWindow::new("2024-01".parse().unwrap(), "2024-03".parse().unwrap()).unwrap();
        assert_eq!(
            client.request_url(&query(window)),
            "https://accounting.example.org/egi/htc/sum_elap_processors/REGION/Year/\
             2024/01/2024/03/custom-alpha.example.eu/onlyinfrajobs/JSON/"
        );
    }

    #[test]
    fn test_unreachable_portal_yields_no_records() {
        // Nothing listens on port 9 of the loopback interface
        let client =
            AccountingPortalClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let window =
            ReportingWindow::new("2024/01".parse().unwrap(), "2024/03".parse().unwrap()).unwrap();
        assert!(client.fetch(&query(window)).is_empty());
    }
}
