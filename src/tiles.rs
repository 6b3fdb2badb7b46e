//! Map tile pass-through.
//!
//! The provider key stays server-side; callers only ever see `/api/tiles?z&x&y`.

use crate::places::SourceError;
use crate::timeout::TimeoutPolicy;
use axum::body::Bytes;
use tracing::debug;

/// Default raster tile template.
pub const DEFAULT_TILE_TEMPLATE: &str =
    "https://maps.geoapify.com/v1/tile/dark-matter-dark-grey/{z}/{x}/{y}.png";
/// Cache header attached to every proxied tile.
pub const TILE_CACHE_CONTROL: &str = "public, max-age=86400";
/// Deepest zoom level forwarded upstream.
pub const MAX_ZOOM: u32 = 22;

/// Web-mercator tile address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCoords {
    pub z: u32,
    pub x: u32,
    pub y: u32,
}

impl TileCoords {
    /// Rejects zoom above [`MAX_ZOOM`] and x/y outside the `2^z` grid.
    pub fn new(z: u32, x: u32, y: u32) -> Result<Self, String> {
        if z > MAX_ZOOM {
            return Err(format!("zoom {} exceeds {}", z, MAX_ZOOM));
        }
        let side = 1u64 << z;
        if u64::from(x) >= side || u64::from(y) >= side {
            return Err(format!("tile {}/{} outside zoom {} grid", x, y, z));
        }
        Ok(Self { z, x, y })
    }
}

#[derive(Clone)]
pub struct TileProxy {
    client: reqwest::Client,
    template: String,
    api_key: String,
    timeout: TimeoutPolicy,
}

impl std::fmt::Debug for TileProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileProxy").field("template", &self.template).finish_non_exhaustive()
    }
}

impl TileProxy {
    pub fn new(
        client: reqwest::Client,
        template: impl Into<String>,
        api_key: impl Into<String>,
        timeout: TimeoutPolicy,
    ) -> Self {
        Self { client, template: template.into(), api_key: api_key.into(), timeout }
    }

    /// Upstream URL for `coords`, key included.
    pub fn tile_url(&self, coords: TileCoords) -> String {
        let path = self
            .template
            .replace("{z}", &coords.z.to_string())
            .replace("{x}", &coords.x.to_string())
            .replace("{y}", &coords.y.to_string());
        let sep = if path.contains('?') { '&' } else { '?' };
        format!("{}{}apiKey={}", path, sep, self.api_key)
    }

    /// Raw PNG bytes. A non-success upstream status is returned as [`SourceError::Status`].
    pub async fn fetch(&self, coords: TileCoords) -> Result<Bytes, SourceError> {
        let url = self.tile_url(coords);
        let bytes = self
            .timeout
            .execute(|| async move {
                let response = self.client.get(&url).send().await?;
                if !response.status().is_success() {
                    return Err(SourceError::Status(response.status().as_u16()));
                }
                Ok(response.bytes().await?)
            })
            .await?;
        debug!(target: "locus::tiles", z = coords.z, x = coords.x, y = coords.y, len = bytes.len(), "tile proxied");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn proxy(template: &str) -> TileProxy {
        TileProxy::new(
            reqwest::Client::new(),
            template,
            "k3y",
            TimeoutPolicy::new(Duration::from_secs(5)).unwrap(),
        )
    }

    #[test]
    fn url_fills_template_and_appends_key() {
        let p = proxy(DEFAULT_TILE_TEMPLATE);
        let url = p.tile_url(TileCoords::new(10, 511, 340).unwrap());
        assert_eq!(
            url,
            "https://maps.geoapify.com/v1/tile/dark-matter-dark-grey/10/511/340.png?apiKey=k3y"
        );
    }

    #[test]
    fn template_with_query_uses_ampersand() {
        let p = proxy("http://tiles.test/{z}/{x}/{y}.png?style=dark");
        assert_eq!(
            p.tile_url(TileCoords::new(0, 0, 0).unwrap()),
            "http://tiles.test/0/0/0.png?style=dark&apiKey=k3y"
        );
    }

    #[test]
    fn coordinates_must_fit_the_zoom_grid() {
        assert!(TileCoords::new(0, 0, 0).is_ok());
        assert!(TileCoords::new(1, 2, 0).is_err());
        assert!(TileCoords::new(23, 0, 0).is_err());
        assert!(TileCoords::new(22, (1 << 22) - 1, 0).is_ok());
    }
}
