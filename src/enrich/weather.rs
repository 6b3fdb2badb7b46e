use crate::places::SourceError;
use crate::timeout::TimeoutPolicy;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Current conditions plus today's and tomorrow's outlook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherInfo {
    pub current_temp: f64,
    pub today_code: i32,
    pub tomorrow_code: i32,
    pub tomorrow_temp: f64,
}

#[derive(Deserialize)]
struct ForecastResponse {
    current_weather: CurrentWeather,
    daily: Daily,
}

#[derive(Deserialize)]
struct CurrentWeather {
    temperature: f64,
}

#[derive(Deserialize)]
struct Daily {
    weathercode: Vec<i32>,
    temperature_2m_max: Vec<f64>,
}

impl TryFrom<ForecastResponse> for WeatherInfo {
    type Error = SourceError;

    fn try_from(r: ForecastResponse) -> Result<Self, Self::Error> {
        let missing = || SourceError::Decode("forecast has fewer than two days".into());
        Ok(Self {
            current_temp: r.current_weather.temperature,
            today_code: *r.daily.weathercode.first().ok_or_else(missing)?,
            tomorrow_code: *r.daily.weathercode.get(1).ok_or_else(missing)?,
            tomorrow_temp: *r.daily.temperature_2m_max.get(1).ok_or_else(missing)?,
        })
    }
}

/// Open-Meteo forecast client with a per-location cache.
///
/// Locations are cached at 3-decimal precision (about 100 m). Only successful
/// lookups are cached, so a transient failure is retried on the next request.
#[derive(Clone)]
pub struct WeatherClient {
    client: reqwest::Client,
    url: String,
    timeout: TimeoutPolicy,
    cache: Cache<String, WeatherInfo>,
}

impl std::fmt::Debug for WeatherClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherClient")
            .field("url", &self.url)
            .field("cached", &self.cache.entry_count())
            .finish_non_exhaustive()
    }
}

impl WeatherClient {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        timeout: TimeoutPolicy,
        capacity: u64,
    ) -> Self {
        Self { client, url: url.into(), timeout, cache: Cache::new(capacity) }
    }

    pub fn cache_key(lat: f64, lon: f64) -> String {
        format!("{:.3},{:.3}", lat, lon)
    }

    /// Cached forecast for (`lat`, `lon`), or `None` if the provider could not be reached.
    pub async fn weather(&self, lat: f64, lon: f64) -> Option<WeatherInfo> {
        let key = Self::cache_key(lat, lon);
        match self.cache.try_get_with(key, self.lookup(lat, lon)).await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(target: "locus::enrich", error = %e, lat, lon, "weather lookup failed");
                None
            }
        }
    }

    /// Uncached forecast request.
    pub async fn lookup(&self, lat: f64, lon: f64) -> Result<WeatherInfo, SourceError> {
        self.timeout
            .execute(|| async move {
                let response = self
                    .client
                    .get(&self.url)
                    .query(&[
                        ("latitude", lat.to_string()),
                        ("longitude", lon.to_string()),
                        ("current_weather", "true".to_string()),
                        ("daily", "weathercode,temperature_2m_max".to_string()),
                        ("timezone", "auto".to_string()),
                    ])
                    .send()
                    .await?;
                if !response.status().is_success() {
                    return Err(SourceError::Status(response.status().as_u16()));
                }
                let body: ForecastResponse = response.json().await?;
                WeatherInfo::try_from(body)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cache_key_rounds_to_three_decimals() {
        assert_eq!(WeatherClient::cache_key(48.85661, 2.35222), "48.857,2.352");
        assert_eq!(WeatherClient::cache_key(-33.0, 151.0), "-33.000,151.000");
    }

    #[test]
    fn forecast_maps_today_and_tomorrow() {
        let raw = json!({
            "current_weather": {"temperature": 17.4, "weathercode": 3},
            "daily": {"weathercode": [3, 61, 2], "temperature_2m_max": [19.0, 15.5, 21.0]}
        });
        let parsed: ForecastResponse = serde_json::from_value(raw).unwrap();
        let info = WeatherInfo::try_from(parsed).unwrap();
        assert_eq!(
            info,
            WeatherInfo { current_temp: 17.4, today_code: 3, tomorrow_code: 61, tomorrow_temp: 15.5 }
        );
        let v = serde_json::to_value(&info).unwrap();
        assert_eq!(v["tomorrowTemp"], json!(15.5));
    }

    #[test]
    fn single_day_forecast_is_a_decode_error() {
        let raw = json!({
            "current_weather": {"temperature": 1.0},
            "daily": {"weathercode": [0], "temperature_2m_max": [2.0]}
        });
        let parsed: ForecastResponse = serde_json::from_value(raw).unwrap();
        assert!(matches!(WeatherInfo::try_from(parsed), Err(SourceError::Decode(_))));
    }
}
