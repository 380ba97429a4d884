//! Style properties shared (or not) by the selected entities.
//!
//! A style panel shows one colour per target when the selection agrees and a
//! "mixed" state when it does not.

use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, EntityKind, EntityRecord, EntityStore, Rgba};

/// Which part of an entity's style a summary describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum StyleTarget {
    Stroke = 0,
    Fill = 1,
    /// Glyph colour of text entities (drawn with the fill colour).
    TextColor = 2,
}

impl StyleTarget {
    pub const ALL: [StyleTarget; 3] = [StyleTarget::Stroke, StyleTarget::Fill, StyleTarget::TextColor];

    pub fn supports(self, kind: EntityKind) -> bool {
        match self {
            StyleTarget::Stroke => kind != EntityKind::Text,
            StyleTarget::Fill => matches!(kind, EntityKind::Rect | EntityKind::Circle | EntityKind::Polygon),
            StyleTarget::TextColor => kind == EntityKind::Text,
        }
    }

    fn color(self, record: &EntityRecord) -> Rgba {
        match self {
            StyleTarget::Stroke => record.style.stroke,
            StyleTarget::Fill | StyleTarget::TextColor => record.style.fill,
        }
    }

    fn enabled(self, record: &EntityRecord) -> bool {
        let style = &record.style;
        match self {
            StyleTarget::Stroke => style.stroke_enabled && style.stroke.a > 0.0 && style.stroke_width > 0.0,
            StyleTarget::Fill => style.fill.a > 0.0,
            StyleTarget::TextColor => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TriState {
    #[default]
    Off,
    On,
    Mixed,
}

impl TriState {
    fn merge(current: Option<TriState>, value: bool) -> TriState {
        let value = if value { TriState::On } else { TriState::Off };
        match current {
            None => value,
            Some(state) if state == value => state,
            Some(_) => TriState::Mixed,
        }
    }
}

/// Summary of one [`StyleTarget`] over a selection.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TargetSummary {
    /// Whether the selected kinds carry this target at all.
    pub supported: TriState,
    pub enabled: TriState,
    /// The shared colour, `None` when nothing supports the target or colours differ.
    pub color: Option<Rgba>,
    /// Stroke width shared by every supporting entity (stroke only).
    pub width: Option<f64>,
}

impl TargetSummary {
    pub fn is_mixed(&self) -> bool {
        self.supported == TriState::Mixed || self.enabled == TriState::Mixed || (self.has_any() && self.color.is_none())
    }

    fn has_any(&self) -> bool {
        self.supported != TriState::Off
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectionStyleSummary {
    /// Live entities counted, not raw selection length.
    pub count: usize,
    pub stroke: TargetSummary,
    pub fill: TargetSummary,
    pub text_color: TargetSummary,
}

impl SelectionStyleSummary {
    pub fn target(&self, target: StyleTarget) -> &TargetSummary {
        match target {
            StyleTarget::Stroke => &self.stroke,
            StyleTarget::Fill => &self.fill,
            StyleTarget::TextColor => &self.text_color,
        }
    }
}

fn summarize_target(records: &[&EntityRecord], target: StyleTarget) -> TargetSummary {
    let mut supported = None;
    let mut enabled = None;
    let mut color: Option<Option<Rgba>> = None;
    let mut width: Option<Option<f64>> = None;
    for record in records {
        let supports = target.supports(record.kind());
        supported = Some(TriState::merge(supported, supports));
        if !supports {
            continue;
        }
        enabled = Some(TriState::merge(enabled, target.enabled(record)));
        let c = target.color(record);
        color = Some(match color {
            None => Some(c),
            Some(shared) => shared.filter(|s| *s == c),
        });
        if target == StyleTarget::Stroke {
            let w = record.style.stroke_width;
            width = Some(match width {
                None => Some(w),
                Some(shared) => shared.filter(|s| *s == w),
            });
        }
    }
    TargetSummary {
        supported: supported.unwrap_or_default(),
        enabled: enabled.unwrap_or_default(),
        color: color.flatten(),
        width: width.flatten(),
    }
}

/// Summarize the style of `ids`. Unknown ids are skipped.
pub fn summarize(store: &EntityStore, ids: &[EntityId]) -> SelectionStyleSummary {
    let records: Vec<&EntityRecord> = ids.iter().filter_map(|id| store.get(*id)).collect();
    SelectionStyleSummary {
        count: records.len(),
        stroke: summarize_target(&records, StyleTarget::Stroke),
        fill: summarize_target(&records, StyleTarget::Fill),
        text_color: summarize_target(&records, StyleTarget::TextColor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Geometry, Style, TextGeometry};
    use kurbo::{Point, Size};

    fn rect_style(fill: Rgba) -> Style {
        Style {
            fill,
            ..Style::default()
        }
    }

    fn rect() -> Geometry {
        Geometry::Rect {
            origin: Point::ORIGIN,
            size: Size::new(10.0, 10.0),
            rotation: 0.0,
        }
    }

    fn line() -> Geometry {
        Geometry::Line {
            p0: Point::ORIGIN,
            p1: Point::new(10.0, 0.0),
        }
    }

    #[test]
    fn test_uniform_selection() {
        let mut store = EntityStore::new();
        let red = Rgba::new(1.0, 0.0, 0.0, 1.0);
        let a = store.create(rect(), rect_style(red)).unwrap();
        let b = store.create(rect(), rect_style(red)).unwrap();
        let summary = summarize(&store, &[a, b]);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.fill.supported, TriState::On);
        assert_eq!(summary.fill.enabled, TriState::On);
        assert_eq!(summary.fill.color, Some(red));
        assert!(!summary.fill.is_mixed());
        assert_eq!(summary.text_color.supported, TriState::Off);
        assert_eq!(summary.text_color.color, None);
    }

    #[test]
    fn test_mixed_kinds_and_colors() {
        let mut store = EntityStore::new();
        let a = store.create(rect(), rect_style(Rgba::new(1.0, 0.0, 0.0, 1.0))).unwrap();
        let b = store.create(rect(), rect_style(Rgba::new(0.0, 0.0, 1.0, 1.0))).unwrap();
        let c = store.create(line(), Style::default()).unwrap();

        let summary = summarize(&store, &[a, b]);
        assert_eq!(summary.fill.color, None);
        assert!(summary.fill.is_mixed());

        let summary = summarize(&store, &[a, c]);
        assert_eq!(summary.fill.supported, TriState::Mixed);
        assert_eq!(summary.stroke.supported, TriState::On);
        assert_eq!(summary.stroke.width, Some(Style::default().stroke_width));
    }

    #[test]
    fn test_text_color_and_unknown_ids() {
        let mut store = EntityStore::new();
        let text = Geometry::Text(TextGeometry {
            origin: Point::ORIGIN,
            content: "hi".to_string(),
            font_id: 0,
            font_size: 12.0,
            rotation: 0.0,
            extent: Size::new(14.0, 12.0),
        });
        let t = store.create(text, Style::default()).unwrap();
        let summary = summarize(&store, &[t, 99]);
        assert_eq!(summary.count, 1);
        assert_eq!(summary.text_color.supported, TriState::On);
        assert_eq!(summary.text_color.color, Some(Style::default().fill));
        assert_eq!(summary.stroke.supported, TriState::Off);
        assert_eq!(summary.stroke.enabled, TriState::Off);
    }
}
