//! Content digest of a document.
//!
//! Two documents with the same layers, entities, draw order, selection and
//! next id produce the same digest, independent of how they got there.
//! Document metadata (id, name) is not part of the digest.

use std::fmt;

use kurbo::Point;

use crate::entity::{EntityId, EntityRecord, EntityStore, Geometry, Rgba};

const DOMAIN: &[u8] = b"inkframe:document:v1";

/// Truncated blake3 hash of a document's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentDigest(pub [u8; 16]);

impl DocumentDigest {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for DocumentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

struct DigestWriter {
    hasher: blake3::Hasher,
}

impl DigestWriter {
    fn u32(&mut self, v: u32) {
        self.hasher.update(&v.to_le_bytes());
    }

    fn len(&mut self, len: usize) {
        self.hasher.update(&(len as u64).to_le_bytes());
    }

    /// `-0.0` hashes like `0.0` and every NaN hashes alike.
    fn f64(&mut self, v: f64) {
        let canonical = if v == 0.0 {
            0.0
        } else if v.is_nan() {
            f64::NAN
        } else {
            v
        };
        self.hasher.update(&canonical.to_bits().to_le_bytes());
    }

    fn point(&mut self, p: Point) {
        self.f64(p.x);
        self.f64(p.y);
    }

    fn rgba(&mut self, c: Rgba) {
        for channel in c.to_array() {
            self.f64(channel as f64);
        }
    }

    fn str(&mut self, s: &str) {
        self.len(s.len());
        self.hasher.update(s.as_bytes());
    }

    fn ids(&mut self, ids: &[EntityId]) {
        self.len(ids.len());
        for id in ids {
            self.u32(*id);
        }
    }

    fn record(&mut self, record: &EntityRecord) {
        self.u32(record.id);
        self.u32(record.kind() as u32);
        self.u32(record.layer);
        self.u32(record.flags.bits());
        self.f64(record.z);
        self.rgba(record.style.fill);
        self.rgba(record.style.stroke);
        self.u32(record.style.stroke_enabled as u32);
        self.f64(record.style.stroke_width);
        match &record.geometry {
            Geometry::Rect { origin, size, rotation } => {
                self.point(*origin);
                self.f64(size.width);
                self.f64(size.height);
                self.f64(*rotation);
            }
            Geometry::Line { p0, p1 } => {
                self.point(*p0);
                self.point(*p1);
            }
            Geometry::Arrow { tail, tip, head } => {
                self.point(*tail);
                self.point(*tip);
                self.f64(*head);
            }
            Geometry::Polyline { points } => {
                self.len(points.len());
                for p in points {
                    self.point(*p);
                }
            }
            Geometry::Circle { center, rx, ry, rotation } => {
                self.point(*center);
                self.f64(*rx);
                self.f64(*ry);
                self.f64(*rotation);
            }
            Geometry::Polygon {
                center,
                rx,
                ry,
                rotation,
                sides,
            } => {
                self.point(*center);
                self.f64(*rx);
                self.f64(*ry);
                self.f64(*rotation);
                self.u32(*sides);
            }
            Geometry::Text(text) => {
                self.point(text.origin);
                self.f64(text.rotation);
                self.u32(text.font_id);
                self.f64(text.font_size);
                self.f64(text.extent.width);
                self.f64(text.extent.height);
                self.str(&text.content);
            }
        }
    }
}

/// Digest of the store plus the ordered selection.
pub fn digest(store: &EntityStore, selection: &[EntityId]) -> DocumentDigest {
    let mut w = DigestWriter {
        hasher: blake3::Hasher::new(),
    };
    w.hasher.update(DOMAIN);

    let layers: Vec<_> = store.layers().collect();
    w.len(layers.len());
    for layer in layers {
        w.u32(layer.id);
        w.u32(layer.flags.bits());
        w.rgba(layer.color);
        w.str(&layer.name);
    }

    let records = store.records_by_id();
    w.len(records.len());
    for record in records {
        w.record(record);
    }

    w.ids(store.draw_order());
    w.ids(selection);
    w.u32(store.next_id());

    let hash = w.hasher.finalize();
    let mut out = [0u8; 16];
    out.copy_from_slice(&hash.as_bytes()[..16]);
    DocumentDigest(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ReorderAction, Style};
    use kurbo::Size;

    fn rect(x: f64) -> Geometry {
        Geometry::Rect {
            origin: Point::new(x, 0.0),
            size: Size::new(10.0, 10.0),
            rotation: 0.0,
        }
    }

    fn two_rects() -> EntityStore {
        let mut store = EntityStore::new();
        store.create(rect(0.0), Style::default()).unwrap();
        store.create(rect(20.0), Style::default()).unwrap();
        store
    }

    #[test]
    fn test_equal_content_equal_digest() {
        let a = two_rects();
        let b = two_rects();
        assert_eq!(digest(&a, &[1]), digest(&b, &[1]));
        assert_eq!(digest(&a, &[1]).to_string().len(), 32);
    }

    #[test]
    fn test_every_part_contributes() {
        let base = two_rects();
        let reference = digest(&base, &[]);

        assert_ne!(digest(&base, &[2]), reference);

        let mut moved = two_rects();
        let patch = crate::entity::EntityPatch::new().with_geometry(rect(1.0));
        moved.update(1, patch).unwrap();
        assert_ne!(digest(&moved, &[]), reference);

        let mut reordered = two_rects();
        reordered.reorder(1, ReorderAction::BringToFront).unwrap();
        assert_ne!(digest(&reordered, &[]), reference);
    }

    #[test]
    fn test_negative_zero_is_canonical() {
        let mut a = EntityStore::new();
        a.create(rect(0.0), Style::default()).unwrap();
        let mut b = EntityStore::new();
        b.create(rect(-0.0), Style::default()).unwrap();
        assert_eq!(digest(&a, &[]), digest(&b, &[]));
    }
}
