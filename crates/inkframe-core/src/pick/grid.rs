//! Uniform spatial hash used as the pick broad phase.

use std::collections::{BTreeSet, HashMap};

use kurbo::Rect;

use crate::entity::EntityId;

type Cell = (i64, i64);

/// Inclusive range of cells an entity was inserted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Span {
    Cells { x0: i64, y0: i64, x1: i64, y1: i64 },
    /// Too large for the grid; tested on every query.
    Overflow,
}

#[derive(Debug, Clone)]
pub struct SpatialHash {
    cell_size: f64,
    max_cells: usize,
    cells: HashMap<Cell, Vec<EntityId>>,
    spans: HashMap<EntityId, Span>,
    overflow: BTreeSet<EntityId>,
}

impl SpatialHash {
    pub fn new(cell_size: f64, max_cells: usize) -> Self {
        Self {
            cell_size: if cell_size > 0.0 { cell_size } else { 50.0 },
            max_cells: max_cells.max(1),
            cells: HashMap::new(),
            spans: HashMap::new(),
            overflow: BTreeSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.spans.contains_key(&id)
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.spans.clear();
        self.overflow.clear();
    }

    fn coord(&self, v: f64) -> i64 {
        // `as` saturates for out-of-range floats.
        (v / self.cell_size).floor() as i64
    }

    fn span_of(&self, rect: Rect) -> Span {
        let (x0, y0) = (self.coord(rect.x0), self.coord(rect.y0));
        let (x1, y1) = (self.coord(rect.x1), self.coord(rect.y1));
        let w = (x1 as i128 - x0 as i128 + 1) as u128;
        let h = (y1 as i128 - y0 as i128 + 1) as u128;
        if w.saturating_mul(h) > self.max_cells as u128 {
            Span::Overflow
        } else {
            Span::Cells { x0, y0, x1, y1 }
        }
    }

    /// Insert or move `id` to cover `bounds`.
    pub fn update(&mut self, id: EntityId, bounds: Rect) {
        let span = self.span_of(bounds);
        if self.spans.get(&id) == Some(&span) {
            return;
        }
        self.remove(id);
        match span {
            Span::Overflow => {
                self.overflow.insert(id);
            }
            Span::Cells { x0, y0, x1, y1 } => {
                for cy in y0..=y1 {
                    for cx in x0..=x1 {
                        self.cells.entry((cx, cy)).or_default().push(id);
                    }
                }
            }
        }
        self.spans.insert(id, span);
    }

    pub fn remove(&mut self, id: EntityId) -> bool {
        let Some(span) = self.spans.remove(&id) else {
            return false;
        };
        match span {
            Span::Overflow => {
                self.overflow.remove(&id);
            }
            Span::Cells { x0, y0, x1, y1 } => {
                for cy in y0..=y1 {
                    for cx in x0..=x1 {
                        if let Some(bucket) = self.cells.get_mut(&(cx, cy)) {
                            bucket.retain(|other| *other != id);
                            if bucket.is_empty() {
                                self.cells.remove(&(cx, cy));
                            }
                        }
                    }
                }
            }
        }
        true
    }

    /// Collect candidate ids whose cells touch `area` into `out`, sorted and de-duplicated.
    pub fn query(&self, area: Rect, out: &mut Vec<EntityId>) {
        out.clear();
        match self.span_of(area) {
            Span::Cells { x0, y0, x1, y1 }
                if ((x1 - x0 + 1) as u128) * ((y1 - y0 + 1) as u128) <= self.spans.len() as u128 =>
            {
                for cy in y0..=y1 {
                    for cx in x0..=x1 {
                        if let Some(bucket) = self.cells.get(&(cx, cy)) {
                            out.extend_from_slice(bucket);
                        }
                    }
                }
                out.extend(self.overflow.iter().copied());
            }
            // Covering more cells than there are entities: scan everything.
            _ => out.extend(self.spans.keys().copied()),
        }
        out.sort_unstable();
        out.dedup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_query_remove() {
        let mut hash = SpatialHash::new(50.0, 64);
        hash.update(1, Rect::new(0.0, 0.0, 10.0, 10.0));
        hash.update(2, Rect::new(200.0, 200.0, 210.0, 210.0));
        let mut out = Vec::new();
        hash.query(Rect::new(5.0, 5.0, 6.0, 6.0), &mut out);
        assert_eq!(out, vec![1]);
        assert!(hash.remove(1));
        hash.query(Rect::new(5.0, 5.0, 6.0, 6.0), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_move_updates_cells() {
        let mut hash = SpatialHash::new(50.0, 64);
        hash.update(7, Rect::new(0.0, 0.0, 10.0, 10.0));
        hash.update(7, Rect::new(500.0, 500.0, 510.0, 510.0));
        let mut out = Vec::new();
        hash.query(Rect::new(0.0, 0.0, 10.0, 10.0), &mut out);
        assert!(out.is_empty());
        hash.query(Rect::new(505.0, 505.0, 506.0, 506.0), &mut out);
        assert_eq!(out, vec![7]);
    }

    #[test]
    fn test_huge_entity_goes_to_overflow() {
        let mut hash = SpatialHash::new(10.0, 4);
        hash.update(3, Rect::new(-1e6, -1e6, 1e6, 1e6));
        hash.update(4, Rect::new(0.0, 0.0, 1.0, 1.0));
        let mut out = Vec::new();
        hash.query(Rect::new(1000.0, 1000.0, 1001.0, 1001.0), &mut out);
        assert_eq!(out, vec![3]);
        assert!(hash.cells.values().all(|bucket| !bucket.contains(&3)));
    }

    #[test]
    fn test_negative_coordinates() {
        let mut hash = SpatialHash::new(50.0, 64);
        hash.update(9, Rect::new(-60.0, -60.0, -55.0, -55.0));
        let mut out = Vec::new();
        hash.query(Rect::new(-58.0, -58.0, -57.0, -57.0), &mut out);
        assert_eq!(out, vec![9]);
    }
}
