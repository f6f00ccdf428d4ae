use crate::core::config::EntsoeProviderConfig;
use crate::core::error::ProviderError;
use crate::core::market::{MarketDataProvider, MarketQuery};
use crate::core::series::{Fetched, RawPeriod, RawPoint, RawSeries, SyncWindow};
use crate::providers::rate_limit::RateLimiter;
use crate::providers::util::{format_period_instant, with_retry};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

const NO_DATA_REASON: &str = "No matching data found";

/// Client for the ENTSO-E transparency platform REST API.
pub struct EntsoeProvider {
    base_url: String,
    security_token: Option<String>,
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
}

impl EntsoeProvider {
    pub fn new(config: &EntsoeProviderConfig) -> Result<Self, ProviderError> {
        let limiter = RateLimiter::new(config.rate_limit.max_calls, config.rate_limit.window());
        Self::with_limiter(config, Arc::new(limiter))
    }

    pub fn with_limiter(
        config: &EntsoeProviderConfig,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent("gridtap/0.3")
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|source| ProviderError::Request {
                url: config.base_url.clone(),
                source,
            })?;
        Ok(EntsoeProvider {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            security_token: config.security_token.clone(),
            client,
            limiter,
        })
    }

    fn query_params(&self, query: &MarketQuery, window: SyncWindow) -> Vec<(&'static str, String)> {
        let mut params = match query {
            MarketQuery::Generation { area } => vec![
                ("documentType", "A75".to_string()),
                ("processType", "A16".to_string()),
                ("in_Domain", area.clone()),
            ],
            MarketQuery::Load { area } => vec![
                ("documentType", "A65".to_string()),
                ("processType", "A16".to_string()),
                ("outBiddingZone_Domain", area.clone()),
            ],
            MarketQuery::DayAheadPrices { area } => vec![
                ("documentType", "A44".to_string()),
                ("in_Domain", area.clone()),
                ("out_Domain", area.clone()),
            ],
            MarketQuery::PhysicalFlow { out_area, in_area } => vec![
                ("documentType", "A11".to_string()),
                ("in_Domain", in_area.clone()),
                ("out_Domain", out_area.clone()),
            ],
        };
        params.push(("periodStart", format_period_instant(window.start_instant())));
        params.push(("periodEnd", format_period_instant(window.end_instant())));
        if let Some(token) = &self.security_token {
            params.push(("securityToken", token.clone()));
        }
        params
    }

    async fn send(
        &self,
        url: &str,
        params: &[(&'static str, String)],
    ) -> Result<(u16, String), ProviderError> {
        let response = with_retry(
            || async { self.client.get(url).query(params).send().await },
            3,
            500,
        )
        .await
        .map_err(|source| ProviderError::Request {
            url: url.to_string(),
            source,
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|source| ProviderError::Request {
                url: url.to_string(),
                source,
            })?;
        Ok((status, body))
    }
}

#[async_trait]
impl MarketDataProvider for EntsoeProvider {
    #[instrument(name = "EntsoeFetch", skip(self, cancel), fields(query = %query, window = %window))]
    async fn fetch(
        &self,
        query: &MarketQuery,
        window: SyncWindow,
        cancel: &CancellationToken,
    ) -> Result<Fetched<Vec<RawSeries>>, ProviderError> {
        self.limiter.acquire(cancel).await?;

        let url = format!("{}/api", self.base_url);
        let params = self.query_params(query, window);
        debug!("Requesting market data from {}", url);

        let (status, body) = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            response = self.send(&url, &params) => response?,
        };
        debug!(status, bytes = body.len(), "Received ENTSO-E response");

        if let Some(reason) = acknowledgement_reason(&body) {
            if reason.starts_with(NO_DATA_REASON) {
                debug!(%reason, "Provider has no data for window");
                return Ok(Fetched::Empty);
            }
            return Err(ProviderError::Status { url, status, body: reason });
        }
        if !(200..300).contains(&status) {
            return Err(ProviderError::Status { url, status, body });
        }

        parse_market_document(&body)
            .map(Fetched::Data)
            .map_err(|message| ProviderError::Parse { url, message })
    }
}

#[derive(Debug, Deserialize)]
struct MarketDocument {
    #[serde(rename = "TimeSeries", default)]
    time_series: Vec<XmlTimeSeries>,
}

#[derive(Debug, Deserialize)]
struct XmlTimeSeries {
    #[serde(rename = "MktPSRType")]
    psr: Option<XmlPsrType>,
    #[serde(rename = "in_Domain.mRID", alias = "inBiddingZone_Domain.mRID")]
    in_domain: Option<XmlText>,
    #[serde(rename = "out_Domain.mRID", alias = "outBiddingZone_Domain.mRID")]
    out_domain: Option<XmlText>,
    #[serde(rename = "currency_Unit.name")]
    currency: Option<String>,
    #[serde(rename = "price_Measure_Unit.name")]
    price_unit: Option<String>,
    #[serde(rename = "Period", default)]
    periods: Vec<XmlPeriod>,
}

#[derive(Debug, Deserialize)]
struct XmlPsrType {
    #[serde(rename = "psrType")]
    psr_type: String,
}

#[derive(Debug, Deserialize)]
struct XmlText {
    #[serde(rename = "$text")]
    value: String,
}

#[derive(Debug, Deserialize)]
struct XmlPeriod {
    #[serde(rename = "timeInterval")]
    interval: XmlInterval,
    resolution: String,
    #[serde(rename = "Point", default)]
    points: Vec<XmlPoint>,
}

#[derive(Debug, Deserialize)]
struct XmlInterval {
    start: String,
}

#[derive(Debug, Deserialize)]
struct XmlPoint {
    position: String,
    quantity: Option<String>,
    #[serde(rename = "price.amount")]
    price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AcknowledgementDocument {
    #[serde(rename = "Reason", default)]
    reasons: Vec<XmlReason>,
}

#[derive(Debug, Deserialize)]
struct XmlReason {
    text: Option<String>,
}

/// The reason text of an `Acknowledgement_MarketDocument`, if `body` is one.
fn acknowledgement_reason(body: &str) -> Option<String> {
    if !body.contains("Acknowledgement_MarketDocument") {
        return None;
    }
    let document: AcknowledgementDocument = quick_xml::de::from_str(body).ok()?;
    let texts: Vec<_> = document
        .reasons
        .into_iter()
        .filter_map(|reason| reason.text)
        .collect();
    Some(texts.join("; "))
}

fn parse_market_document(body: &str) -> Result<Vec<RawSeries>, String> {
    let document: MarketDocument = quick_xml::de::from_str(body).map_err(|e| e.to_string())?;
    Ok(document
        .time_series
        .into_iter()
        .map(|series| RawSeries {
            psr_type: series.psr.map(|psr| psr.psr_type),
            in_domain: series.in_domain.map(|domain| domain.value),
            out_domain: series.out_domain.map(|domain| domain.value),
            currency: series.currency,
            price_unit: series.price_unit,
            periods: series
                .periods
                .into_iter()
                .map(|period| RawPeriod {
                    start: period.interval.start,
                    resolution: period.resolution,
                    points: period
                        .points
                        .into_iter()
                        .map(|point| RawPoint {
                            position: point.position,
                            value: point.quantity.or(point.price).unwrap_or_default(),
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect())
}
