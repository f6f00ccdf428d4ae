use crate::core::config::RiksbankProviderConfig;
use crate::core::currency::{ExchangeRateEntry, ExchangeRateSource};
use crate::core::error::ProviderError;
use crate::core::series::{Fetched, SyncWindow};
use crate::providers::util::{format_date, with_retry};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[derive(Debug, Deserialize)]
struct CrossRate {
    date: NaiveDate,
    value: Option<Decimal>,
}

/// Daily SEK cross rates from the Riksbank SWEA API.
pub struct RiksbankProvider {
    base_url: String,
    series: String,
    client: reqwest::Client,
}

impl RiksbankProvider {
    pub fn new(config: &RiksbankProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent("gridtap/0.3")
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|source| ProviderError::Request {
                url: config.base_url.clone(),
                source,
            })?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            series: config.series.clone(),
            client,
        })
    }
}

#[async_trait]
impl ExchangeRateSource for RiksbankProvider {
    #[instrument(name = "RiksbankFetch", skip(self), fields(series = %self.series))]
    async fn fetch_rates(
        &self,
        window: SyncWindow,
    ) -> Result<Fetched<Vec<ExchangeRateEntry>>, ProviderError> {
        let url = format!(
            "{}/CrossRates/{}/SEK/{}/{}",
            self.base_url,
            self.series,
            format_date(window.from),
            format_date(window.to)
        );
        debug!("Requesting exchange rates from {}", url);

        let response = with_retry(|| self.client.get(&url).send(), 3, 500)
            .await
            .map_err(|source| ProviderError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(Fetched::Empty);
        }
        let body = response
            .text()
            .await
            .map_err(|source| ProviderError::Request {
                url: url.clone(),
                source,
            })?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                url,
                status: status.as_u16(),
                body,
            });
        }

        let rates: Vec<CrossRate> =
            serde_json::from_str(&body).map_err(|e| ProviderError::Parse {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let entries: Vec<ExchangeRateEntry> = rates
            .into_iter()
            .filter_map(|rate| match rate.value {
                Some(value) => Some(ExchangeRateEntry {
                    date: rate.date,
                    value,
                }),
                None => {
                    warn!(date = %rate.date, "Skipping exchange rate without value");
                    None
                }
            })
            .collect();

        if entries.is_empty() {
            return Ok(Fetched::Empty);
        }
        debug!(count = entries.len(), "Received exchange rates");
        Ok(Fetched::Data(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn provider(server: &MockServer) -> RiksbankProvider {
        RiksbankProvider::new(&RiksbankProviderConfig {
            base_url: server.uri(),
            series: "SEKEURPMI".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_rates() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/CrossRates/SEKEURPMI/SEK/2024-01-01/2024-01-08"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"date":"2024-01-02","value":11.1005},{"date":"2024-01-03","value":11.0425}]"#,
            ))
            .mount(&mock_server)
            .await;

        let result = provider(&mock_server)
            .fetch_rates(SyncWindow::new(date(2024, 1, 1), date(2024, 1, 8)))
            .await
            .unwrap();

        assert_eq!(
            result,
            Fetched::Data(vec![
                ExchangeRateEntry {
                    date: date(2024, 1, 2),
                    value: dec!(11.1005),
                },
                ExchangeRateEntry {
                    date: date(2024, 1, 3),
                    value: dec!(11.0425),
                },
            ])
        );
    }

    #[tokio::test]
    async fn test_no_content_is_empty() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        let result = provider(&mock_server)
            .fetch_rates(SyncWindow::new(date(2024, 1, 6), date(2024, 1, 7)))
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_empty_array_is_empty() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&mock_server)
            .await;

        let result = provider(&mock_server)
            .fetch_rates(SyncWindow::new(date(2024, 1, 6), date(2024, 1, 7)))
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
            .mount(&mock_server)
            .await;

        let result = provider(&mock_server)
            .fetch_rates(SyncWindow::new(date(2024, 1, 1), date(2024, 1, 8)))
            .await;
        assert!(matches!(
            result,
            Err(ProviderError::Status { status: 429, .. })
        ));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"error\":true}"))
            .mount(&mock_server)
            .await;

        let result = provider(&mock_server)
            .fetch_rates(SyncWindow::new(date(2024, 1, 1), date(2024, 1, 8)))
            .await;
        assert!(matches!(result, Err(ProviderError::Parse { .. })));
    }
}
