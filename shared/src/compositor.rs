use serde::{Deserialize, Serialize};

use crate::colors::{parse_hex_color, to_hex};
use crate::overlay::is_visited_overlay_id;

/// One (overlay, country) pair. Built per render, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayItem {
    pub iso_code: String,
    #[serde(default)]
    pub color: String,
    pub overlay_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
}

impl OverlayItem {
    pub fn is_visited_system(&self) -> bool {
        is_visited_overlay_id(&self.overlay_id)
    }

    fn has_color(&self) -> bool {
        !self.color.trim().is_empty()
    }
}

/// Resolve the display color for one country from every item touching it.
///
/// 1. A visited-overlay item wins outright.
/// 2. A single item is used unchanged.
/// 3. No items falls back to `fallback`.
/// 4. Otherwise items are composited source-over onto opaque white, last
///    item first, so the first item ends up on top.
///
/// Items with an empty color are ignored entirely.
pub fn composite(items: &[OverlayItem], fallback: &str) -> String {
    let colored: Vec<&OverlayItem> = items.iter().filter(|item| item.has_color()).collect();

    if let Some(visited) = colored.iter().find(|item| item.is_visited_system()) {
        return visited.color.clone();
    }

    match colored.as_slice() {
        [] => fallback.to_owned(),
        [single] => single.color.clone(),
        many => blend(many.iter().map(|item| item.color.as_str()))
            .unwrap_or_else(|| fallback.to_owned()),
    }
}

/// Every blended color is opaque; alpha digits in the hex are ignored.
const BLEND_ALPHA: f64 = 1.0;

/// Source-over blend in reverse order onto opaque white. `None` when no
/// color parses.
pub fn blend<'a>(colors: impl DoubleEndedIterator<Item = &'a str>) -> Option<String> {
    let mut acc = [1.0_f64; 3];
    let mut blended_any = false;

    for raw in colors.rev() {
        let Some(color) = parse_hex_color(raw) else {
            continue;
        };
        blended_any = true;
        let src = [
            color.r as f64 / 255.0,
            color.g as f64 / 255.0,
            color.b as f64 / 255.0,
        ];
        for (channel, value) in acc.iter_mut().zip(src) {
            *channel = value * BLEND_ALPHA + *channel * (1.0 - BLEND_ALPHA);
        }
    }

    if !blended_any {
        return None;
    }

    let [r, g, b] = acc.map(|channel| (channel * 255.0).round().clamp(0.0, 255.0) as u8);
    Some(to_hex(r, g, b))
}

#[cfg(test)]
mod tests {
    use super::{OverlayItem, blend, composite};
    use crate::overlay::VISITED_OVERLAY_ID;

    const FALLBACK: &str = "#d0d0d0";

    fn item(color: &str, overlay_id: &str) -> OverlayItem {
        OverlayItem {
            iso_code: "FR".to_string(),
            color: color.to_string(),
            overlay_id: overlay_id.to_string(),
            tooltip: None,
        }
    }

    #[test]
    fn visited_overlay_wins_over_everything() {
        let items = vec![
            item("#ff0000", "wishlist"),
            item("#00aa00", VISITED_OVERLAY_ID),
            item("#0000ff", "work"),
        ];
        assert_eq!(composite(&items, FALLBACK), "#00aa00");
    }

    #[test]
    fn visited_overlay_color_is_returned_verbatim() {
        let items = vec![
            item("#ABC", VISITED_OVERLAY_ID),
            item("#0000ff80", "translucent"),
        ];
        assert_eq!(composite(&items, FALLBACK), "#ABC");
    }

    #[test]
    fn single_item_is_unchanged() {
        assert_eq!(
            composite(&[item("#FF000080", "a")], FALLBACK),
            "#FF000080"
        );
        assert_eq!(
            composite(&[item("#123456", "a"), item("", "b")], FALLBACK),
            "#123456"
        );
    }

    #[test]
    fn no_colored_items_uses_fallback() {
        assert_eq!(composite(&[], FALLBACK), FALLBACK);
        assert_eq!(
            composite(&[item("", "a"), item("  ", VISITED_OVERLAY_ID)], FALLBACK),
            FALLBACK
        );
    }

    #[test]
    fn opaque_items_blend_last_first_so_first_is_on_top() {
        let items = vec![item("#111", "a"), item("#222", "b")];
        assert_eq!(composite(&items, FALLBACK), "#111111");

        let swapped = vec![item("#222", "b"), item("#111", "a")];
        assert_eq!(composite(&swapped, FALLBACK), "#222222");
    }

    #[test]
    fn alpha_digits_are_ignored_when_blending() {
        let items = vec![item("#ff000080", "a"), item("#0000ff", "b")];
        assert_eq!(composite(&items, FALLBACK), "#ff0000");

        let items = vec![item("#0f08", "a"), item("#ff0000", "b")];
        assert_eq!(composite(&items, FALLBACK), "#00ff00");
    }

    #[test]
    fn unparseable_colors_are_skipped_when_blending() {
        let items = vec![item("not-a-color", "a"), item("#00000080", "b")];
        assert_eq!(composite(&items, FALLBACK), "#000000");

        let items = vec![item("nope", "a"), item("still nope", "b")];
        assert_eq!(composite(&items, FALLBACK), FALLBACK);
    }

    #[test]
    fn blend_of_nothing_is_none() {
        assert_eq!(blend(std::iter::empty()), None);
    }
}
