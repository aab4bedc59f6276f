//! Static map preview URLs for the location view.

use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::config::MapPreviewConfig;
use crate::error::{CoreError, CoreResult};
use crate::types::Coordinates;

/// A static map image for a location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPreview {
    pub center: Coordinates,
    pub image_url: String,
}

/// Builds static map URLs keyed by coordinates or place title.
#[derive(Debug, Clone)]
pub struct MapPreviewBuilder {
    base: Url,
    config: MapPreviewConfig,
}

impl MapPreviewBuilder {
    pub fn new(config: MapPreviewConfig) -> CoreResult<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| CoreError::Config(format!("invalid map preview URL: {}", e)))?;
        Ok(Self { base, config })
    }

    /// Map centred on raw coordinates, with a marker.
    pub fn for_coordinates(&self, center: Coordinates) -> MapPreview {
        MapPreview {
            center,
            image_url: self.build(&center.to_string()),
        }
    }

    /// Map centred on a place, looked up by its title.
    pub fn for_place(&self, title: &str) -> String {
        self.build(title)
    }

    fn build(&self, center: &str) -> String {
        let mut url = self.base.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("center", center)
                .append_pair("zoom", &self.config.zoom.to_string())
                .append_pair("size", &self.config.size)
                .append_pair("markers", center);
            if let Some(key) = &self.config.api_key {
                query.append_pair("key", key);
            }
        }
        debug!("Map preview for {}", center);
        url.into()
    }
}
