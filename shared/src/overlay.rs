use serde::{Deserialize, Serialize};

use crate::colors::overlay_color_hex;

/// Id of the system-owned "Visited Countries" overlay.
pub const VISITED_OVERLAY_ID: &str = "visited-countries";
pub const VISITED_OVERLAY_NAME: &str = "Visited Countries";
pub const DEFAULT_VISITED_COLOR: &str = "#4caf50";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OverlayError {
    #[error("overlay {0} is system-owned")]
    Reserved(String),
    #[error("overlay {0} not found")]
    NotFound(String),
    #[error("overlay {0} already exists")]
    Duplicate(String),
}

pub fn is_visited_overlay_id(id: &str) -> bool {
    id == VISITED_OVERLAY_ID
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterLabels {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,
}

fn default_visible() -> bool {
    true
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Persisted shape shared by every overlay kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_labels: Option<FilterLabels>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub timeline_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline_snapshot: Option<bool>,
}

impl OverlayRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: color.into(),
            countries: Vec::new(),
            visible: true,
            order: None,
            filter_labels: None,
            timeline_enabled: false,
            timeline_snapshot: None,
        }
    }

    fn sort_key(&self) -> i32 {
        self.order.unwrap_or(0)
    }
}

/// An overlay, tagged by whether the system owns it. The variant is decided
/// by id when a record is deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OverlayRecord", into = "OverlayRecord")]
pub enum Overlay {
    Regular(OverlayRecord),
    VisitedSystem(OverlayRecord),
}

impl From<OverlayRecord> for Overlay {
    fn from(record: OverlayRecord) -> Self {
        if is_visited_overlay_id(&record.id) {
            Self::VisitedSystem(record)
        } else {
            Self::Regular(record)
        }
    }
}

impl From<Overlay> for OverlayRecord {
    fn from(overlay: Overlay) -> Self {
        match overlay {
            Overlay::Regular(record) | Overlay::VisitedSystem(record) => record,
        }
    }
}

impl Overlay {
    pub fn visited_default(color: &str) -> Self {
        let mut record = OverlayRecord::new(VISITED_OVERLAY_ID, VISITED_OVERLAY_NAME, color);
        record.order = Some(0);
        Self::VisitedSystem(record)
    }

    pub fn record(&self) -> &OverlayRecord {
        match self {
            Self::Regular(record) | Self::VisitedSystem(record) => record,
        }
    }

    pub fn id(&self) -> &str {
        &self.record().id
    }

    pub fn name(&self) -> &str {
        &self.record().name
    }

    pub fn color(&self) -> &str {
        &self.record().color
    }

    pub fn countries(&self) -> &[String] {
        &self.record().countries
    }

    pub fn visible(&self) -> bool {
        self.record().visible
    }

    pub fn order(&self) -> Option<i32> {
        self.record().order
    }

    pub fn is_visited_system(&self) -> bool {
        matches!(self, Self::VisitedSystem(_))
    }

    pub fn timeline_enabled(&self) -> bool {
        self.record().timeline_enabled
    }

    pub fn timeline_snapshot(&self) -> bool {
        self.record().timeline_snapshot.unwrap_or(false)
    }

    pub fn set_order(&mut self, order: Option<i32>) {
        match self {
            Self::Regular(record) | Self::VisitedSystem(record) => record.order = order,
        }
    }
}

/// Ordered overlays with exactly one system-owned "Visited Countries" entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayCollection {
    visited: OverlayRecord,
    regular: Vec<OverlayRecord>,
    /// Position of the visited overlay within the ordered view.
    visited_slot: usize,
}

impl OverlayCollection {
    /// Normalize a loaded list: stable sort by `order` (missing = 0), keep the
    /// first visited record, synthesize one at the front if none exists.
    pub fn from_loaded(mut overlays: Vec<Overlay>, visited_color: &str) -> Self {
        overlays.sort_by_key(|overlay| overlay.record().sort_key());

        let mut visited = None;
        let mut visited_slot = 0;
        let mut regular = Vec::with_capacity(overlays.len());
        for overlay in overlays {
            match overlay {
                Overlay::VisitedSystem(record) => {
                    if visited.is_none() {
                        visited_slot = regular.len();
                        visited = Some(record);
                    }
                }
                Overlay::Regular(record) => regular.push(record),
            }
        }

        let visited = visited.unwrap_or_else(|| {
            visited_slot = 0;
            OverlayRecord::from(Overlay::visited_default(visited_color))
        });

        Self {
            visited,
            regular,
            visited_slot,
        }
    }

    pub fn visited(&self) -> &OverlayRecord {
        &self.visited
    }

    pub fn regular(&self) -> &[OverlayRecord] {
        &self.regular
    }

    pub fn len(&self) -> usize {
        self.regular.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Overlays in display order.
    pub fn to_vec(&self) -> Vec<Overlay> {
        let mut out = Vec::with_capacity(self.len());
        for (index, record) in self.regular.iter().enumerate() {
            if index == self.visited_slot {
                out.push(Overlay::VisitedSystem(self.visited.clone()));
            }
            out.push(Overlay::Regular(record.clone()));
        }
        if self.visited_slot >= self.regular.len() {
            out.push(Overlay::VisitedSystem(self.visited.clone()));
        }
        out
    }

    pub fn get(&self, id: &str) -> Option<Overlay> {
        if is_visited_overlay_id(id) {
            return Some(Overlay::VisitedSystem(self.visited.clone()));
        }
        self.regular
            .iter()
            .find(|record| record.id == id)
            .cloned()
            .map(Overlay::Regular)
    }

    /// Append a user overlay. An empty color is replaced by the name-derived
    /// default color.
    pub fn add(&mut self, overlay: Overlay) -> Result<Overlay, OverlayError> {
        let mut record = match overlay {
            Overlay::VisitedSystem(record) => return Err(OverlayError::Reserved(record.id)),
            Overlay::Regular(record) => record,
        };
        if is_visited_overlay_id(&record.id) {
            return Err(OverlayError::Reserved(record.id));
        }
        if self.regular.iter().any(|existing| existing.id == record.id) {
            return Err(OverlayError::Duplicate(record.id));
        }
        if record.color.trim().is_empty() {
            record.color = overlay_color_hex(&record.name);
        }
        self.regular.push(record.clone());
        self.resort();
        Ok(Overlay::Regular(record))
    }

    /// Replace an overlay. For the visited overlay only the user-editable
    /// fields are taken; countries and color stay system-owned.
    pub fn edit(&mut self, overlay: Overlay) -> Result<Overlay, OverlayError> {
        let edited = match overlay {
            Overlay::VisitedSystem(record) => {
                self.visited.name = record.name;
                self.visited.visible = record.visible;
                self.visited.order = record.order;
                self.visited.filter_labels = record.filter_labels;
                self.visited.timeline_enabled = record.timeline_enabled;
                self.visited.timeline_snapshot = record.timeline_snapshot;
                Overlay::VisitedSystem(self.visited.clone())
            }
            Overlay::Regular(record) => {
                let slot = self
                    .regular
                    .iter_mut()
                    .find(|existing| existing.id == record.id)
                    .ok_or_else(|| OverlayError::NotFound(record.id.clone()))?;
                *slot = record.clone();
                Overlay::Regular(record)
            }
        };
        self.resort();
        Ok(edited)
    }

    pub fn remove(&mut self, id: &str) -> Result<Overlay, OverlayError> {
        if is_visited_overlay_id(id) {
            return Err(OverlayError::Reserved(id.to_owned()));
        }
        let index = self
            .regular
            .iter()
            .position(|record| record.id == id)
            .ok_or_else(|| OverlayError::NotFound(id.to_owned()))?;
        let removed = self.regular.remove(index);
        if index < self.visited_slot {
            self.visited_slot -= 1;
        }
        Ok(Overlay::Regular(removed))
    }

    /// Assign `order = index` to each listed overlay and re-sort. Returns only
    /// the overlays whose order actually changed. Unknown ids fail before any
    /// change is made.
    pub fn reorder(&mut self, ids: &[String]) -> Result<Vec<Overlay>, OverlayError> {
        if let Some(unknown) = ids.iter().find(|id| self.get(id).is_none()) {
            return Err(OverlayError::NotFound(unknown.clone()));
        }

        let mut changed = Vec::new();
        let mut ordered = self.to_vec();
        for overlay in &mut ordered {
            let Some(index) = ids.iter().position(|id| id == overlay.id()) else {
                continue;
            };
            let order = Some(index as i32);
            if overlay.order() != order {
                overlay.set_order(order);
                changed.push(overlay.clone());
            }
        }

        let visited_color = self.visited.color.clone();
        *self = Self::from_loaded(ordered, &visited_color);
        Ok(changed)
    }

    /// Sort again the way a reload of the same records would.
    fn resort(&mut self) {
        let visited_color = self.visited.color.clone();
        *self = Self::from_loaded(self.to_vec(), &visited_color);
    }

    /// Copy of this collection with the visited overlay's system-owned fields
    /// replaced, or `None` when they already match exactly.
    pub fn with_visited(&self, countries: &[String], color: &str) -> Option<Self> {
        if self.visited.countries.as_slice() == countries && self.visited.color == color {
            return None;
        }
        let mut next = self.clone();
        next.visited.countries = countries.to_vec();
        next.visited.color = color.to_owned();
        Some(next)
    }
}

/// Reconcile the visited overlay with freshly aggregated data. Comparison is
/// exact, order included.
pub fn reconcile_visited(
    collection: &OverlayCollection,
    visited: &[String],
    color: &str,
) -> Option<OverlayCollection> {
    collection.with_visited(visited, color)
}
