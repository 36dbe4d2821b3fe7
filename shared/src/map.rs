use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::aggregate::VisitCountMap;
use crate::colors::shade_for_visits;
use crate::compositor::{OverlayItem, composite};
use crate::overlay::{Overlay, OverlayCollection};
use crate::trip::normalize_code;

/// Final fill for one country on the map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapFill {
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    pub overlay_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visits: Option<u32>,
}

/// Country sets for the year currently selected on the timeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimelineView {
    pub year: i32,
    /// Countries with a trip overlapping `year`.
    pub in_year: Vec<String>,
    /// Countries completed in or before `year`.
    pub up_to_year: Vec<String>,
}

impl TimelineView {
    fn countries_for(&self, overlay: &Overlay) -> &[String] {
        if overlay.timeline_snapshot() {
            &self.up_to_year
        } else {
            &self.in_year
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MapOptions<'a> {
    /// Color of countries no visible overlay touches.
    pub fallback: &'a str,
    /// Shade the visited overlay by visit frequency when present.
    pub visit_counts: Option<&'a VisitCountMap>,
    /// Timeline mode. Only timeline-aware overlays are drawn.
    pub timeline: Option<&'a TimelineView>,
}

impl<'a> MapOptions<'a> {
    pub fn new(fallback: &'a str) -> Self {
        Self {
            fallback,
            visit_counts: None,
            timeline: None,
        }
    }
}

/// Countries an overlay paints under the given mode, or `None` when the overlay
/// is not drawn at all.
fn effective_countries(
    overlay: &Overlay,
    timeline: Option<&TimelineView>,
) -> Option<Vec<String>> {
    if !overlay.visible() {
        return None;
    }
    let Some(view) = timeline else {
        return Some(overlay.countries().to_vec());
    };

    let year_set = view.countries_for(overlay);
    if overlay.is_visited_system() {
        return Some(year_set.to_vec());
    }
    if !overlay.timeline_enabled() {
        return None;
    }
    let allowed: HashSet<String> = year_set.iter().map(|code| normalize_code(code)).collect();
    Some(
        overlay
            .countries()
            .iter()
            .filter(|code| allowed.contains(&normalize_code(code)))
            .cloned()
            .collect(),
    )
}

/// One item per (visible overlay, country), in collection order.
pub fn overlay_items(
    collection: &OverlayCollection,
    timeline: Option<&TimelineView>,
) -> Vec<OverlayItem> {
    let mut items = Vec::new();
    for overlay in collection.to_vec() {
        let Some(countries) = effective_countries(&overlay, timeline) else {
            continue;
        };
        let mut seen = HashSet::new();
        for code in countries {
            let code = normalize_code(&code);
            if code.is_empty() || !seen.insert(code.clone()) {
                continue;
            }
            items.push(OverlayItem {
                iso_code: code,
                color: overlay.color().to_owned(),
                overlay_id: overlay.id().to_owned(),
                tooltip: Some(overlay.name().to_owned()),
            });
        }
    }
    items
}

/// Group items per country. Items keep their relative order, which is the
/// order the compositor blends in.
pub fn group_by_country(items: Vec<OverlayItem>) -> BTreeMap<String, Vec<OverlayItem>> {
    let mut grouped: BTreeMap<String, Vec<OverlayItem>> = BTreeMap::new();
    for item in items {
        grouped.entry(item.iso_code.clone()).or_default().push(item);
    }
    grouped
}

fn shade_visited(items: &mut [OverlayItem], count: Option<u32>, max_count: u32) {
    let Some(count) = count else {
        return;
    };
    for item in items.iter_mut().filter(|item| item.is_visited_system()) {
        if let Some(shaded) = shade_for_visits(&item.color, count, max_count) {
            item.color = shaded;
        }
    }
}

/// Composite every country touched by a visible overlay. Countries absent from
/// the result take `options.fallback`.
pub fn compose_map(
    collection: &OverlayCollection,
    options: MapOptions<'_>,
) -> BTreeMap<String, MapFill> {
    let grouped = group_by_country(overlay_items(collection, options.timeline));
    let max_count = options
        .visit_counts
        .and_then(|counts| counts.values().copied().max())
        .unwrap_or(0);

    grouped
        .into_iter()
        .map(|(code, mut items)| {
            let visits = options
                .visit_counts
                .and_then(|counts| counts.get(&code).copied());
            if options.visit_counts.is_some() {
                shade_visited(&mut items, visits, max_count);
            }

            let names: Vec<&str> = items
                .iter()
                .filter_map(|item| item.tooltip.as_deref())
                .collect();
            let tooltip = (!names.is_empty()).then(|| names.join(", "));
            let fill = MapFill {
                color: composite(&items, options.fallback),
                tooltip,
                overlay_ids: items.iter().map(|item| item.overlay_id.clone()).collect(),
                visits,
            };
            (code, fill)
        })
        .collect()
}
