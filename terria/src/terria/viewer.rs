//! State handed to the map viewer.
//!
//! No rendering happens here. [`MainViewer`] records what a viewer adapter
//! would need: mode, cameras, the active base map, splitter and picked
//! features. Picked features from init data are held back until a viewer is
//! attached.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::TerriaError;
use crate::model::ModelRef;

/// Which renderer the viewer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ViewerMode {
    /// 3D globe.
    #[default]
    Cesium,
    /// 2D map.
    Leaflet,
}

/// A camera position expressed as a bounding rectangle in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraView {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl CameraView {
    /// Parses `{west, south, east, north}`, optionally nested under `rectangle`.
    pub fn from_json(json: &Value) -> Result<Self, TerriaError> {
        let rectangle = json.get("rectangle").unwrap_or(json);
        let coordinate = |name: &str| {
            rectangle.get(name).and_then(Value::as_f64).ok_or_else(|| {
                TerriaError::with_title(
                    "Invalid camera",
                    format!("Camera is missing a numeric `{}`.", name),
                )
            })
        };
        Ok(Self {
            west: coordinate("west")?,
            south: coordinate("south")?,
            east: coordinate("east")?,
            north: coordinate("north")?,
        })
    }
}

/// A camera move requested before any renderer could carry it out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomRequest {
    pub camera: CameraView,
    pub flight_duration_secs: f64,
}

/// A feature reference carried in share data.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PickedFeature {
    pub hash: Option<i64>,
    pub name: Option<String>,
    /// Id of the catalog item the feature belongs to.
    pub catalog_item_id: Option<String>,
}

impl PickedFeature {
    fn from_json(json: &Value) -> Option<Self> {
        let object = json.as_object()?;
        Some(Self {
            hash: object.get("hash").and_then(Value::as_i64),
            name: object.get("name").and_then(Value::as_str).map(str::to_string),
            catalog_item_id: object
                .get("catalogItemId")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    fn matches(&self, other: &PickedFeature) -> bool {
        self.hash == other.hash && self.name == other.name
    }
}

/// Latitude, longitude and height of a pick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub height: f64,
}

/// Result of picking at a location on the map.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PickedFeatures {
    pub location: Option<PickLocation>,
    pub provider_coords: Map<String, Value>,
    pub features: Vec<PickedFeature>,
}

impl PickedFeatures {
    /// Parses the `pickedFeatures` object of init data.
    ///
    /// Returns the picked set and the feature named by `current`, if it is
    /// one of the picked features.
    pub fn from_json(json: &Map<String, Value>) -> (Self, Option<PickedFeature>) {
        let features: Vec<PickedFeature> = json
            .get("entities")
            .and_then(Value::as_array)
            .map(|entities| entities.iter().filter_map(PickedFeature::from_json).collect())
            .unwrap_or_default();

        let location = json.get("pickCoords").and_then(|coords| {
            Some(PickLocation {
                latitude: coords.get("lat")?.as_f64()?,
                longitude: coords.get("lng")?.as_f64()?,
                height: coords.get("height").and_then(Value::as_f64).unwrap_or(0.0),
            })
        });

        let provider_coords = json
            .get("providerCoords")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let selected = json
            .get("current")
            .and_then(PickedFeature::from_json)
            .and_then(|current| features.iter().find(|f| f.matches(&current)).cloned());

        (
            Self {
                location,
                provider_coords,
                features,
            },
            selected,
        )
    }
}

#[derive(Debug, Default)]
struct ViewerState {
    mode: ViewerMode,
    use_terrain: bool,
    attached: bool,
    home_camera: Option<CameraView>,
    zoom_request: Option<ZoomRequest>,
    base_map: Option<ModelRef>,
    show_splitter: bool,
    split_position: f64,
    picked_features: Option<PickedFeatures>,
    selected_feature: Option<PickedFeature>,
    pending_picked_features: Option<Map<String, Value>>,
}

/// The main map viewer's state.
#[derive(Debug)]
pub struct MainViewer {
    state: RwLock<ViewerState>,
}

impl Default for MainViewer {
    fn default() -> Self {
        Self {
            state: RwLock::new(ViewerState {
                use_terrain: true,
                split_position: 0.5,
                ..ViewerState::default()
            }),
        }
    }
}

impl MainViewer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn viewer_mode(&self) -> ViewerMode {
        self.state.read().mode
    }

    pub fn use_terrain(&self) -> bool {
        self.state.read().use_terrain
    }

    /// Sets the mode; `use_terrain` only applies to [`ViewerMode::Cesium`].
    pub fn set_viewer_mode(&self, mode: ViewerMode, use_terrain: Option<bool>) {
        let mut state = self.state.write();
        state.mode = mode;
        if let Some(use_terrain) = use_terrain {
            state.use_terrain = use_terrain;
        }
    }

    /// Applies a mode name as used in init data and local properties.
    ///
    /// Accepts `3d`, `3dSmooth` and `2d` case-insensitively. Returns `false`
    /// for anything else.
    pub fn apply_mode_name(&self, name: &str) -> bool {
        match name.to_lowercase().as_str() {
            "3d" => self.set_viewer_mode(ViewerMode::Cesium, Some(true)),
            "3dsmooth" => self.set_viewer_mode(ViewerMode::Cesium, Some(false)),
            "2d" => self.set_viewer_mode(ViewerMode::Leaflet, None),
            _ => return false,
        }
        true
    }

    /// The mode name [`apply_mode_name`](Self::apply_mode_name) accepts
    /// for the current mode.
    pub fn mode_name(&self) -> &'static str {
        let state = self.state.read();
        match (state.mode, state.use_terrain) {
            (ViewerMode::Cesium, true) => "3d",
            (ViewerMode::Cesium, false) => "3dSmooth",
            (ViewerMode::Leaflet, _) => "2d",
        }
    }

    pub fn home_camera(&self) -> Option<CameraView> {
        self.state.read().home_camera
    }

    pub fn set_home_camera(&self, camera: CameraView) {
        self.state.write().home_camera = Some(camera);
    }

    /// Requests a camera move. Only the latest request is kept.
    pub fn zoom_to(&self, camera: CameraView, flight_duration_secs: f64) {
        self.state.write().zoom_request = Some(ZoomRequest {
            camera,
            flight_duration_secs,
        });
    }

    /// Hands the pending zoom request to the renderer.
    pub fn take_zoom_request(&self) -> Option<ZoomRequest> {
        self.state.write().zoom_request.take()
    }

    pub fn base_map(&self) -> Option<ModelRef> {
        self.state.read().base_map.clone()
    }

    pub(crate) fn set_base_map(&self, base_map: Option<ModelRef>) {
        self.state.write().base_map = base_map;
    }

    pub fn show_splitter(&self) -> bool {
        self.state.read().show_splitter
    }

    pub fn set_show_splitter(&self, show: bool) {
        self.state.write().show_splitter = show;
    }

    pub fn split_position(&self) -> f64 {
        self.state.read().split_position
    }

    pub fn set_split_position(&self, position: f64) {
        self.state.write().split_position = position.clamp(0.0, 1.0);
    }

    pub fn is_attached(&self) -> bool {
        self.state.read().attached
    }

    /// Marks a renderer as attached and applies deferred picked features.
    pub fn attach(&self) {
        let pending = {
            let mut state = self.state.write();
            state.attached = true;
            state.pending_picked_features.take()
        };
        if let Some(pending) = pending {
            debug!("Applying deferred picked features");
            self.load_picked_features(&pending);
        }
    }

    /// Applies picked features now, or once a renderer is attached.
    pub fn defer_picked_features(&self, picked: Map<String, Value>) {
        let mut state = self.state.write();
        if state.attached {
            drop(state);
            self.load_picked_features(&picked);
        } else {
            state.pending_picked_features = Some(picked);
        }
    }

    fn load_picked_features(&self, picked: &Map<String, Value>) {
        let (features, selected) = PickedFeatures::from_json(picked);
        let mut state = self.state.write();
        state.picked_features = Some(features);
        if selected.is_some() {
            state.selected_feature = selected;
        }
    }

    pub fn picked_features(&self) -> Option<PickedFeatures> {
        self.state.read().picked_features.clone()
    }

    pub fn selected_feature(&self) -> Option<PickedFeature> {
        self.state.read().selected_feature.clone()
    }

    /// Clears picked and selected features.
    pub fn clear_picked_features(&self) {
        let mut state = self.state.write();
        state.picked_features = None;
        state.selected_feature = None;
    }

    /// Drops picked features belonging to `model`.
    pub fn remove_picked_features_for(&self, model: &ModelRef) {
        let Some(id) = model.unique_id() else {
            return;
        };
        let mut state = self.state.write();
        let belongs = |f: &PickedFeature| f.catalog_item_id.as_deref() == Some(id);
        if state.selected_feature.as_ref().is_some_and(belongs) {
            state.selected_feature = None;
        }
        if let Some(picked) = state.picked_features.as_mut() {
            picked.features.retain(|f| !belongs(f));
        }
    }
}
