//! Nearest-facility lookup: device position → facility finder → route view.
//!
//! ```text
//! Idle ──find_nearest──▶ Requesting ──position──▶ Querying ──ok──▶ Resolved
//!                           │                        │
//!                           └──no capability/denied──┴──failed──▶ Failed
//! ```
//!
//! `refresh()` restarts from `Requesting` once a query has settled. A
//! completion that belongs to an older run is dropped.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::capability::{Capability, FacilityFinder, FacilityRequest, GeoLocator};
use crate::config::AppConfig;
use crate::error::{CoreError, CoreResult};
use crate::preview::{MapPreview, MapPreviewBuilder};
use crate::types::{Coordinates, LocationQueryResult, PlaceReference};

#[derive(Debug, Clone, Default, PartialEq)]
pub enum LocationPhase {
    #[default]
    Idle,
    Requesting,
    Querying {
        coordinates: Coordinates,
    },
    Resolved {
        coordinates: Coordinates,
        result: LocationQueryResult,
    },
    Failed {
        reason: String,
        coordinates: Option<Coordinates>,
    },
}

impl LocationPhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Requesting => "requesting",
            Self::Querying { .. } => "querying",
            Self::Resolved { .. } => "resolved",
            Self::Failed { .. } => "failed",
        }
    }

    fn is_settled(&self) -> bool {
        matches!(self, Self::Resolved { .. } | Self::Failed { .. })
    }
}

/// A grounded place with its preview image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceCard {
    pub place: PlaceReference,
    pub preview_url: String,
}

/// What to show under the route narrative.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlaceListing {
    Grounded { places: Vec<PlaceCard> },
    /// No grounded places came back; show the query position instead.
    FallbackMap { map: MapPreview },
}

/// Render-ready snapshot of the location flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LocationView {
    Idle,
    Locating,
    Searching { fallback: MapPreview },
    Route { narrative: String, listing: PlaceListing },
    Failed { reason: String },
}

#[derive(Debug, Default)]
struct LocationState {
    phase: LocationPhase,
    generation: u64,
}

/// Orchestrates the nearest-facility lookup.
#[derive(Clone)]
pub struct LocationFinder {
    geolocation: Capability<Arc<dyn GeoLocator>>,
    finder: Arc<dyn FacilityFinder>,
    config: Arc<AppConfig>,
    previews: MapPreviewBuilder,
    state: Arc<Mutex<LocationState>>,
}

impl LocationFinder {
    pub fn new(
        geolocation: Capability<Arc<dyn GeoLocator>>,
        finder: Arc<dyn FacilityFinder>,
        config: Arc<AppConfig>,
    ) -> CoreResult<Self> {
        let previews = MapPreviewBuilder::new(config.map_preview.clone())?;
        Ok(Self {
            geolocation,
            finder,
            config,
            previews,
            state: Arc::new(Mutex::new(LocationState::default())),
        })
    }

    pub fn phase(&self) -> LocationPhase {
        self.state.lock().phase.clone()
    }

    /// Locate the device and query the nearest facility.
    ///
    /// Returns the phase this run settled in. Any earlier run still in
    /// flight is superseded.
    pub async fn find_nearest(&self) -> LocationPhase {
        let generation = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.phase = LocationPhase::Requesting;
            state.generation
        };
        info!("Requesting device position (run {})", generation);

        let locator = match self.geolocation.as_ref() {
            Capability::Available(locator) => Arc::clone(locator),
            Capability::Unavailable => {
                warn!("Geolocation capability absent");
                let reason = self.config.notices.geolocation_unsupported.clone();
                return self.settle(generation, LocationPhase::Failed {
                    reason,
                    coordinates: None,
                });
            }
        };

        let coordinates = match locator.current_position().await {
            Ok(coordinates) => coordinates,
            Err(e) => {
                warn!("Position request failed: {}", e);
                let reason = self.config.notices.location_denied.clone();
                return self.settle(generation, LocationPhase::Failed {
                    reason,
                    coordinates: None,
                });
            }
        };

        {
            let mut state = self.state.lock();
            if state.generation != generation {
                debug!("Position fix for superseded run {} dropped", generation);
                return state.phase.clone();
            }
            state.phase = LocationPhase::Querying { coordinates };
        }
        info!("Querying nearest facility around {}", coordinates);

        let request = FacilityRequest::new(coordinates, &self.config.prompts.facility_instruction);
        let next = match self.finder.find_facility(request).await {
            Ok(response) => {
                let narrative = if response.narrative.trim().is_empty() {
                    self.config.fallbacks.empty_facility.clone()
                } else {
                    response.narrative
                };
                let places: Vec<PlaceReference> = response
                    .grounding
                    .iter()
                    .filter_map(|chunk| chunk.to_place())
                    .collect();
                info!("Facility query resolved with {} place(s)", places.len());
                LocationPhase::Resolved {
                    coordinates,
                    result: LocationQueryResult { narrative, places },
                }
            }
            Err(e) => {
                warn!("Facility query failed: {}", e);
                LocationPhase::Failed {
                    reason: self.config.notices.facility_fetch_failed.clone(),
                    coordinates: Some(coordinates),
                }
            }
        };

        self.settle(generation, next)
    }

    /// Re-run the lookup after it has resolved or failed.
    pub async fn refresh(&self) -> CoreResult<LocationPhase> {
        {
            let state = self.state.lock();
            if !state.phase.is_settled() {
                return Err(CoreError::invalid_state(
                    "refresh",
                    state.phase.name(),
                    "resolved or failed",
                ));
            }
        }
        Ok(self.find_nearest().await)
    }

    fn settle(&self, generation: u64, next: LocationPhase) -> LocationPhase {
        let mut state = self.state.lock();
        if state.generation != generation {
            debug!("Result for superseded run {} dropped", generation);
            return state.phase.clone();
        }
        state.phase = next;
        state.phase.clone()
    }

    /// Snapshot for rendering.
    ///
    /// A resolved query without grounded places renders the coordinate map,
    /// never an empty list.
    pub fn view(&self) -> LocationView {
        match self.phase() {
            LocationPhase::Idle => LocationView::Idle,
            LocationPhase::Requesting => LocationView::Locating,
            LocationPhase::Querying { coordinates } => LocationView::Searching {
                fallback: self.previews.for_coordinates(coordinates),
            },
            LocationPhase::Resolved { coordinates, result } => {
                let listing = if result.places.is_empty() {
                    PlaceListing::FallbackMap {
                        map: self.previews.for_coordinates(coordinates),
                    }
                } else {
                    PlaceListing::Grounded {
                        places: result
                            .places
                            .into_iter()
                            .map(|place| PlaceCard {
                                preview_url: self.previews.for_place(&place.title),
                                place,
                            })
                            .collect(),
                    }
                };
                LocationView::Route {
                    narrative: result.narrative,
                    listing,
                }
            }
            LocationPhase::Failed { reason, .. } => LocationView::Failed { reason },
        }
    }
}
