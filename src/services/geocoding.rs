use std::time::Duration;

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::config::GeocoderConfig;

/// Best-effort forward geocoder.
///
/// Every failure mode (missing key, timeout, HTTP error, unparseable body)
/// returns `None`; the settlement flow falls back to configured default
/// coordinates rather than failing checkout.
#[derive(Clone)]
pub struct GeocodingService {
    config: GeocoderConfig,
    client: reqwest::Client,
}

impl GeocodingService {
    pub fn new(config: GeocoderConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Resolves a free-form address to `(longitude, latitude)`.
    #[instrument(skip(self), fields(address = %address))]
    pub async fn geocode(&self, address: &str) -> Option<(f64, f64)> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            warn!("Geocoder API key not configured, using fallback coordinates");
            return None;
        };

        let response = self
            .client
            .get(&self.config.base_url)
            .query(&[
                ("apikey", api_key),
                ("geocode", address),
                ("format", "json"),
            ])
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!(status = %r.status(), "Geocoder API error");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Geocoder request failed");
                return None;
            }
        };

        let body: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Geocoder returned invalid JSON");
                return None;
            }
        };

        match parse_position(&body) {
            Some((lon, lat)) => {
                info!(lon, lat, "Address geocoded");
                Some((lon, lat))
            }
            None => {
                warn!("Geocoder response had no usable position");
                None
            }
        }
    }
}

/// Extracts the first `Point.pos` ("lon lat") from a geocoder response body.
fn parse_position(body: &Value) -> Option<(f64, f64)> {
    let pos = body
        .pointer("/response/GeoObjectCollection/featureMember/0/GeoObject/Point/pos")?
        .as_str()?;
    let mut parts = pos.split_whitespace();
    let lon: f64 = parts.next()?.parse().ok()?;
    let lat: f64 = parts.next()?.parse().ok()?;
    Some((lon, lat))
}
