//! Binary command buffers: decoding, validation and atomic application.
//!
//! Layout (little-endian):
//!
//! ```text
//! header   u32 magic 0x4B4E4946 ("FINK"), u32 version 1, u32 command_count, u32 reserved
//! record   u32 opcode, u32 target_id, u32 payload_len, u32 reserved, payload
//! ```
//!
//! Floats are `f32` and must be finite. A style block is 40 bytes:
//! fill rgba (4 x f32), stroke rgba (4 x f32), u32 stroke_enabled, f32 stroke_width.
//!
//! | op | name | payload |
//! |----|------|---------|
//! | 1  | ClearAll | empty |
//! | 2  | UpsertRect | x, y, w, h, rotation, style |
//! | 3  | UpsertLine | x0, y0, x1, y1, style |
//! | 4  | UpsertPolyline | u32 count, style, count x (x, y); count < 2 deletes |
//! | 5  | DeleteEntity | empty |
//! | 6  | SetDrawOrder | u32 count, count x u32 id |
//! | 7  | UpsertCircle | cx, cy, rx, ry, rotation, style |
//! | 8  | UpsertPolygon | cx, cy, rx, ry, rotation, u32 sides, style |
//! | 9  | UpsertArrow | x0, y0, x1, y1, head, style |
//! | 10 | UpsertText | x, y, font_size, rotation, u32 font_id, u32 byte_len, style, utf-8 bytes |
//! | 11 | SetEntityLayer | u32 layer |
//! | 12 | SetEntityFlags | u32 flags |
//! | 13 | SetEntityZ | z |
//! | 14 | UpsertLayer | color rgba, u32 flags, u32 name_len, utf-8 name (target = layer id) |
//! | 15 | DeleteLayer | empty (target = layer id) |
//! | 16 | Reorder | u32 action (1 front, 2 back, 3 forward, 4 backward) |
//! | 17 | SetViewScale | scale |

mod dispatch;

pub use dispatch::{ApplyContext, ApplyReport, apply_commands, validate_commands};

use kurbo::{Point, Size};
use thiserror::Error;

use crate::entity::{
    EntityFlags, EntityId, Geometry, Layer, LayerFlags, LayerId, ReorderAction, Rgba, StoreError, Style,
    TextGeometry,
};
use crate::error::ErrorKind;
use crate::wire::{ByteReader, ByteWriter, WireError, try_reserve};

pub const COMMAND_MAGIC: u32 = 0x4B4E_4946;
pub const COMMAND_VERSION: u32 = 1;
pub const HEADER_LEN: usize = 16;
pub const RECORD_HEADER_LEN: usize = 16;
const STYLE_LEN: usize = 40;

/// Wire opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    ClearAll = 1,
    UpsertRect = 2,
    UpsertLine = 3,
    UpsertPolyline = 4,
    DeleteEntity = 5,
    SetDrawOrder = 6,
    UpsertCircle = 7,
    UpsertPolygon = 8,
    UpsertArrow = 9,
    UpsertText = 10,
    SetEntityLayer = 11,
    SetEntityFlags = 12,
    SetEntityZ = 13,
    UpsertLayer = 14,
    DeleteLayer = 15,
    Reorder = 16,
    SetViewScale = 17,
}

impl Opcode {
    pub fn from_u32(value: u32) -> Option<Self> {
        use Opcode::*;
        Some(match value {
            1 => ClearAll,
            2 => UpsertRect,
            3 => UpsertLine,
            4 => UpsertPolyline,
            5 => DeleteEntity,
            6 => SetDrawOrder,
            7 => UpsertCircle,
            8 => UpsertPolygon,
            9 => UpsertArrow,
            10 => UpsertText,
            11 => SetEntityLayer,
            12 => SetEntityFlags,
            13 => SetEntityZ,
            14 => UpsertLayer,
            15 => DeleteLayer,
            16 => Reorder,
            17 => SetViewScale,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("bad command buffer magic {0:#010x}")]
    BadMagic(u32),
    #[error("unsupported command buffer version {found} (expected {COMMAND_VERSION})")]
    UnsupportedVersion { found: u32 },
    #[error("command {index}: unknown opcode {opcode}")]
    UnknownOpcode { index: usize, opcode: u32 },
    #[error("command {index}: payload is {found} bytes, opcode {opcode} needs {expected}")]
    PayloadLength {
        index: usize,
        opcode: u32,
        expected: usize,
        found: usize,
    },
    #[error("{count} trailing bytes after the last command at offset {offset}")]
    TrailingBytes { offset: usize, count: usize },
    #[error("command {index}: {reason}")]
    InvalidPayload { index: usize, reason: &'static str },
    #[error("command {index} rejected: {source}")]
    Rejected {
        index: usize,
        #[source]
        source: StoreError,
    },
}

impl CommandError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::Wire(e) => e.kind(),
            CommandError::UnsupportedVersion { .. } => ErrorKind::Version,
            CommandError::Rejected { source, .. } => source.kind(),
            CommandError::BadMagic(_)
            | CommandError::UnknownOpcode { .. }
            | CommandError::PayloadLength { .. }
            | CommandError::TrailingBytes { .. }
            | CommandError::InvalidPayload { .. } => ErrorKind::Protocol,
        }
    }
}

/// A decoded command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ClearAll,
    /// Create or replace an entity. Text extents are measured at apply time.
    Upsert { id: EntityId, geometry: Geometry, style: Style },
    /// Delete; with `if_present` a missing entity is not an error.
    Delete { id: EntityId, if_present: bool },
    SetDrawOrder(Vec<EntityId>),
    SetLayer { id: EntityId, layer: LayerId },
    SetFlags { id: EntityId, flags: EntityFlags },
    SetZ { id: EntityId, z: f64 },
    UpsertLayer(Layer),
    DeleteLayer(LayerId),
    Reorder { id: EntityId, action: ReorderAction },
    SetViewScale(f64),
}

fn read_point(r: &mut ByteReader<'_>) -> Result<Point, WireError> {
    Ok(Point::new(r.read_f32()? as f64, r.read_f32()? as f64))
}

fn read_rgba(r: &mut ByteReader<'_>) -> Result<Rgba, WireError> {
    Ok(Rgba::new(r.read_f32()?, r.read_f32()?, r.read_f32()?, r.read_f32()?))
}

fn read_style(r: &mut ByteReader<'_>) -> Result<Style, WireError> {
    Ok(Style {
        fill: read_rgba(r)?,
        stroke: read_rgba(r)?,
        stroke_enabled: r.read_u32()? != 0,
        stroke_width: r.read_f32()? as f64,
    })
}

fn expect_len(index: usize, opcode: u32, expected: usize, found: usize) -> Result<(), CommandError> {
    if expected == found {
        Ok(())
    } else {
        Err(CommandError::PayloadLength {
            index,
            opcode,
            expected,
            found,
        })
    }
}

/// Length of a fixed prefix plus `count` items of `item` bytes, or `None` on overflow.
fn variable_len(prefix: usize, count: u32, item: usize) -> Option<usize> {
    (count as usize).checked_mul(item)?.checked_add(prefix)
}

/// Decode a whole buffer. Nothing is validated against a store here.
pub fn decode_commands(bytes: &[u8]) -> Result<Vec<Command>, CommandError> {
    let mut r = ByteReader::new(bytes);
    let magic = r.read_u32()?;
    if magic != COMMAND_MAGIC {
        return Err(CommandError::BadMagic(magic));
    }
    let version = r.read_u32()?;
    if version != COMMAND_VERSION {
        return Err(CommandError::UnsupportedVersion { found: version });
    }
    let count = r.read_u32()? as usize;
    let _reserved = r.read_u32()?;

    let mut commands = Vec::new();
    try_reserve(&mut commands, count.min(r.remaining() / RECORD_HEADER_LEN))?;
    for index in 0..count {
        let opcode = r.read_u32()?;
        let target = r.read_u32()?;
        let payload_len = r.read_u32()? as usize;
        let _reserved = r.read_u32()?;
        let Some(op) = Opcode::from_u32(opcode) else {
            return Err(CommandError::UnknownOpcode { index, opcode });
        };
        let payload = r.take(payload_len)?;
        commands.push(decode_one(index, op, target, payload)?);
    }
    if !r.is_empty() {
        return Err(CommandError::TrailingBytes {
            offset: r.offset(),
            count: r.remaining(),
        });
    }
    Ok(commands)
}

fn decode_one(index: usize, op: Opcode, target: u32, payload: &[u8]) -> Result<Command, CommandError> {
    let opcode = op as u32;
    let len = payload.len();
    let mut p = ByteReader::new(payload);
    let command = match op {
        Opcode::ClearAll => {
            expect_len(index, opcode, 0, len)?;
            Command::ClearAll
        }
        Opcode::UpsertRect => {
            expect_len(index, opcode, 20 + STYLE_LEN, len)?;
            let origin = read_point(&mut p)?;
            let size = Size::new(p.read_f32()? as f64, p.read_f32()? as f64);
            let rotation = p.read_f32()? as f64;
            Command::Upsert {
                id: target,
                geometry: Geometry::Rect { origin, size, rotation },
                style: read_style(&mut p)?,
            }
        }
        Opcode::UpsertLine => {
            expect_len(index, opcode, 16 + STYLE_LEN, len)?;
            let p0 = read_point(&mut p)?;
            let p1 = read_point(&mut p)?;
            Command::Upsert {
                id: target,
                geometry: Geometry::Line { p0, p1 },
                style: read_style(&mut p)?,
            }
        }
        Opcode::UpsertPolyline => {
            let count = p.read_u32()?;
            let expected = variable_len(4 + STYLE_LEN, count, 8).ok_or(CommandError::InvalidPayload {
                index,
                reason: "point count overflows",
            })?;
            expect_len(index, opcode, expected, len)?;
            let style = read_style(&mut p)?;
            if count < 2 {
                // Consume the (at most one) point so the payload is fully read.
                for _ in 0..count {
                    read_point(&mut p)?;
                }
                Command::Delete {
                    id: target,
                    if_present: true,
                }
            } else {
                let mut points = Vec::new();
                try_reserve(&mut points, count as usize)?;
                for _ in 0..count {
                    points.push(read_point(&mut p)?);
                }
                Command::Upsert {
                    id: target,
                    geometry: Geometry::Polyline { points },
                    style,
                }
            }
        }
        Opcode::DeleteEntity => {
            expect_len(index, opcode, 0, len)?;
            Command::Delete {
                id: target,
                if_present: false,
            }
        }
        Opcode::SetDrawOrder => {
            let count = p.read_u32()?;
            let expected = variable_len(4, count, 4).ok_or(CommandError::InvalidPayload {
                index,
                reason: "id count overflows",
            })?;
            expect_len(index, opcode, expected, len)?;
            let mut ids = Vec::new();
            try_reserve(&mut ids, count as usize)?;
            for _ in 0..count {
                ids.push(p.read_u32()?);
            }
            Command::SetDrawOrder(ids)
        }
        Opcode::UpsertCircle => {
            expect_len(index, opcode, 20 + STYLE_LEN, len)?;
            let center = read_point(&mut p)?;
            let rx = p.read_f32()? as f64;
            let ry = p.read_f32()? as f64;
            let rotation = p.read_f32()? as f64;
            Command::Upsert {
                id: target,
                geometry: Geometry::Circle { center, rx, ry, rotation },
                style: read_style(&mut p)?,
            }
        }
        Opcode::UpsertPolygon => {
            expect_len(index, opcode, 24 + STYLE_LEN, len)?;
            let center = read_point(&mut p)?;
            let rx = p.read_f32()? as f64;
            let ry = p.read_f32()? as f64;
            let rotation = p.read_f32()? as f64;
            let sides = p.read_u32()?;
            Command::Upsert {
                id: target,
                geometry: Geometry::Polygon {
                    center,
                    rx,
                    ry,
                    rotation,
                    sides,
                },
                style: read_style(&mut p)?,
            }
        }
        Opcode::UpsertArrow => {
            expect_len(index, opcode, 20 + STYLE_LEN, len)?;
            let tail = read_point(&mut p)?;
            let tip = read_point(&mut p)?;
            let head = p.read_f32()? as f64;
            Command::Upsert {
                id: target,
                geometry: Geometry::Arrow { tail, tip, head },
                style: read_style(&mut p)?,
            }
        }
        Opcode::UpsertText => {
            if len < 24 + STYLE_LEN {
                return Err(CommandError::PayloadLength {
                    index,
                    opcode,
                    expected: 24 + STYLE_LEN,
                    found: len,
                });
            }
            let origin = read_point(&mut p)?;
            let font_size = p.read_f32()? as f64;
            let rotation = p.read_f32()? as f64;
            let font_id = p.read_u32()?;
            let byte_len = p.read_u32()?;
            let expected = variable_len(24 + STYLE_LEN, byte_len, 1).ok_or(CommandError::InvalidPayload {
                index,
                reason: "text length overflows",
            })?;
            expect_len(index, opcode, expected, len)?;
            let style = read_style(&mut p)?;
            let content = p.read_str(byte_len as usize)?.to_owned();
            Command::Upsert {
                id: target,
                geometry: Geometry::Text(TextGeometry {
                    origin,
                    content,
                    font_id,
                    font_size,
                    rotation,
                    extent: Size::ZERO,
                }),
                style,
            }
        }
        Opcode::SetEntityLayer => {
            expect_len(index, opcode, 4, len)?;
            Command::SetLayer {
                id: target,
                layer: p.read_u32()?,
            }
        }
        Opcode::SetEntityFlags => {
            expect_len(index, opcode, 4, len)?;
            let bits = p.read_u32()?;
            let flags = EntityFlags::from_bits(bits).ok_or(CommandError::InvalidPayload {
                index,
                reason: "unknown entity flag bits",
            })?;
            Command::SetFlags { id: target, flags }
        }
        Opcode::SetEntityZ => {
            expect_len(index, opcode, 4, len)?;
            Command::SetZ {
                id: target,
                z: p.read_f32()? as f64,
            }
        }
        Opcode::UpsertLayer => {
            if len < 24 {
                return Err(CommandError::PayloadLength {
                    index,
                    opcode,
                    expected: 24,
                    found: len,
                });
            }
            let color = read_rgba(&mut p)?;
            let bits = p.read_u32()?;
            let flags = LayerFlags::from_bits(bits).ok_or(CommandError::InvalidPayload {
                index,
                reason: "unknown layer flag bits",
            })?;
            let name_len = p.read_u32()?;
            let expected = variable_len(24, name_len, 1).ok_or(CommandError::InvalidPayload {
                index,
                reason: "layer name length overflows",
            })?;
            expect_len(index, opcode, expected, len)?;
            let name = p.read_str(name_len as usize)?.to_owned();
            Command::UpsertLayer(Layer {
                id: target,
                name,
                color,
                flags,
            })
        }
        Opcode::DeleteLayer => {
            expect_len(index, opcode, 0, len)?;
            Command::DeleteLayer(target)
        }
        Opcode::Reorder => {
            expect_len(index, opcode, 4, len)?;
            let raw = p.read_u32()?;
            let action = ReorderAction::from_u32(raw).ok_or(CommandError::InvalidPayload {
                index,
                reason: "unknown reorder action",
            })?;
            Command::Reorder { id: target, action }
        }
        Opcode::SetViewScale => {
            expect_len(index, opcode, 4, len)?;
            Command::SetViewScale(p.read_f32()? as f64)
        }
    };
    Ok(command)
}

/// Builds command buffers.
#[derive(Debug, Clone)]
pub struct CommandWriter {
    out: ByteWriter,
    count: u32,
}

impl Default for CommandWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandWriter {
    pub fn new() -> Self {
        let mut out = ByteWriter::with_capacity(256);
        out.put_u32(COMMAND_MAGIC);
        out.put_u32(COMMAND_VERSION);
        out.put_u32(0);
        out.put_u32(0);
        Self { out, count: 0 }
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append a record with an arbitrary opcode and payload.
    pub fn raw(&mut self, opcode: u32, target: u32, payload: &[u8]) -> &mut Self {
        self.out.put_u32(opcode);
        self.out.put_u32(target);
        self.out.put_u32(payload.len() as u32);
        self.out.put_u32(0);
        self.out.put_bytes(payload);
        self.count += 1;
        self
    }

    fn record(&mut self, op: Opcode, target: u32, build: impl FnOnce(&mut ByteWriter)) -> &mut Self {
        let mut payload = ByteWriter::new();
        build(&mut payload);
        self.raw(op as u32, target, payload.as_slice())
    }

    pub fn clear_all(&mut self) -> &mut Self {
        self.record(Opcode::ClearAll, 0, |_| {})
    }

    /// Encode an upsert for any geometry kind.
    pub fn upsert(&mut self, id: EntityId, geometry: &Geometry, style: &Style) -> &mut Self {
        match geometry {
            Geometry::Rect { origin, size, rotation } => self.record(Opcode::UpsertRect, id, |w| {
                put_point(w, *origin);
                w.put_f32(size.width as f32);
                w.put_f32(size.height as f32);
                w.put_f32(*rotation as f32);
                put_style(w, style);
            }),
            Geometry::Line { p0, p1 } => self.record(Opcode::UpsertLine, id, |w| {
                put_point(w, *p0);
                put_point(w, *p1);
                put_style(w, style);
            }),
            Geometry::Arrow { tail, tip, head } => self.record(Opcode::UpsertArrow, id, |w| {
                put_point(w, *tail);
                put_point(w, *tip);
                w.put_f32(*head as f32);
                put_style(w, style);
            }),
            Geometry::Polyline { points } => self.upsert_polyline(id, points, style),
            Geometry::Circle { center, rx, ry, rotation } => self.record(Opcode::UpsertCircle, id, |w| {
                put_point(w, *center);
                w.put_f32(*rx as f32);
                w.put_f32(*ry as f32);
                w.put_f32(*rotation as f32);
                put_style(w, style);
            }),
            Geometry::Polygon {
                center,
                rx,
                ry,
                rotation,
                sides,
            } => self.record(Opcode::UpsertPolygon, id, |w| {
                put_point(w, *center);
                w.put_f32(*rx as f32);
                w.put_f32(*ry as f32);
                w.put_f32(*rotation as f32);
                w.put_u32(*sides);
                put_style(w, style);
            }),
            Geometry::Text(text) => self.record(Opcode::UpsertText, id, |w| {
                put_point(w, text.origin);
                w.put_f32(text.font_size as f32);
                w.put_f32(text.rotation as f32);
                w.put_u32(text.font_id);
                w.put_u32(text.content.len() as u32);
                put_style(w, style);
                w.put_bytes(text.content.as_bytes());
            }),
        }
    }

    pub fn upsert_rect(&mut self, id: EntityId, origin: Point, size: Size, rotation: f64, style: &Style) -> &mut Self {
        self.upsert(id, &Geometry::Rect { origin, size, rotation }, style)
    }

    pub fn upsert_line(&mut self, id: EntityId, p0: Point, p1: Point, style: &Style) -> &mut Self {
        self.upsert(id, &Geometry::Line { p0, p1 }, style)
    }

    /// Fewer than two points encodes a delete-if-present.
    pub fn upsert_polyline(&mut self, id: EntityId, points: &[Point], style: &Style) -> &mut Self {
        self.record(Opcode::UpsertPolyline, id, |w| {
            w.put_u32(points.len() as u32);
            put_style(w, style);
            for point in points {
                put_point(w, *point);
            }
        })
    }

    pub fn upsert_text(
        &mut self,
        id: EntityId,
        origin: Point,
        content: &str,
        font_id: u32,
        font_size: f64,
        style: &Style,
    ) -> &mut Self {
        let text = TextGeometry {
            origin,
            content: content.to_owned(),
            font_id,
            font_size,
            rotation: 0.0,
            extent: Size::ZERO,
        };
        self.upsert(id, &Geometry::Text(text), style)
    }

    pub fn delete(&mut self, id: EntityId) -> &mut Self {
        self.record(Opcode::DeleteEntity, id, |_| {})
    }

    pub fn set_draw_order(&mut self, ids: &[EntityId]) -> &mut Self {
        self.record(Opcode::SetDrawOrder, 0, |w| {
            w.put_u32(ids.len() as u32);
            for id in ids {
                w.put_u32(*id);
            }
        })
    }

    pub fn set_layer(&mut self, id: EntityId, layer: LayerId) -> &mut Self {
        self.record(Opcode::SetEntityLayer, id, |w| w.put_u32(layer))
    }

    pub fn set_flags(&mut self, id: EntityId, flags: EntityFlags) -> &mut Self {
        self.record(Opcode::SetEntityFlags, id, |w| w.put_u32(flags.bits()))
    }

    pub fn set_z(&mut self, id: EntityId, z: f64) -> &mut Self {
        self.record(Opcode::SetEntityZ, id, |w| w.put_f32(z as f32))
    }

    pub fn upsert_layer(&mut self, layer: &Layer) -> &mut Self {
        self.record(Opcode::UpsertLayer, layer.id, |w| {
            put_rgba(w, layer.color);
            w.put_u32(layer.flags.bits());
            w.put_u32(layer.name.len() as u32);
            w.put_bytes(layer.name.as_bytes());
        })
    }

    pub fn delete_layer(&mut self, id: LayerId) -> &mut Self {
        self.record(Opcode::DeleteLayer, id, |_| {})
    }

    pub fn reorder(&mut self, id: EntityId, action: ReorderAction) -> &mut Self {
        self.record(Opcode::Reorder, id, |w| w.put_u32(action as u32))
    }

    pub fn set_view_scale(&mut self, scale: f64) -> &mut Self {
        self.record(Opcode::SetViewScale, 0, |w| w.put_f32(scale as f32))
    }

    /// Patch the command count and return the encoded buffer.
    pub fn finish(&mut self) -> Vec<u8> {
        let mut out = std::mem::take(&mut self.out);
        out.patch_u32(8, self.count);
        let bytes = out.into_inner();
        *self = Self::new();
        bytes
    }
}

fn put_point(w: &mut ByteWriter, p: Point) {
    w.put_f32(p.x as f32);
    w.put_f32(p.y as f32);
}

fn put_rgba(w: &mut ByteWriter, c: Rgba) {
    w.put_f32(c.r);
    w.put_f32(c.g);
    w.put_f32(c.b);
    w.put_f32(c.a);
}

fn put_style(w: &mut ByteWriter, style: &Style) {
    put_rgba(w, style.fill);
    put_rgba(w, style.stroke);
    w.put_u32(style.stroke_enabled as u32);
    w.put_f32(style.stroke_width as f32);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(count: u32) -> ByteWriter {
        let mut w = ByteWriter::new();
        w.put_u32(COMMAND_MAGIC);
        w.put_u32(COMMAND_VERSION);
        w.put_u32(count);
        w.put_u32(0);
        w
    }

    #[test]
    fn test_decode_writer_output() {
        let style = Style::default();
        let mut writer = CommandWriter::new();
        writer
            .upsert_rect(5, Point::new(1.0, 2.0), Size::new(3.0, 4.0), 0.5, &style)
            .upsert_polyline(6, &[Point::new(0.0, 0.0), Point::new(1.0, 1.0)], &style)
            .upsert_text(7, Point::new(0.0, 0.0), "hi", 2, 12.0, &style)
            .reorder(5, ReorderAction::BringToFront)
            .delete(6);
        let commands = decode_commands(&writer.finish()).unwrap();
        assert_eq!(commands.len(), 5);
        match &commands[0] {
            Command::Upsert {
                id: 5,
                geometry: Geometry::Rect { origin, size, rotation },
                ..
            } => {
                assert_eq!(*origin, Point::new(1.0, 2.0));
                assert_eq!(*size, Size::new(3.0, 4.0));
                assert!((rotation - 0.5).abs() < 1e-6);
            }
            other => panic!("unexpected {other:?}"),
        }
        match &commands[2] {
            Command::Upsert {
                geometry: Geometry::Text(text),
                ..
            } => assert_eq!(text.content, "hi"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            commands[4],
            Command::Delete {
                id: 6,
                if_present: false
            }
        );
    }

    #[test]
    fn test_short_polyline_is_delete_if_present() {
        let mut writer = CommandWriter::new();
        writer.upsert_polyline(3, &[Point::new(1.0, 1.0)], &Style::default());
        let commands = decode_commands(&writer.finish()).unwrap();
        assert_eq!(
            commands,
            vec![Command::Delete {
                id: 3,
                if_present: true
            }]
        );
    }

    #[test]
    fn test_bad_magic_and_version() {
        let mut w = ByteWriter::new();
        w.put_u32(0xDEAD_BEEF);
        w.put_u32(1);
        w.put_u32(0);
        w.put_u32(0);
        assert_eq!(decode_commands(w.as_slice()), Err(CommandError::BadMagic(0xDEAD_BEEF)));

        let mut w = ByteWriter::new();
        w.put_u32(COMMAND_MAGIC);
        w.put_u32(2);
        w.put_u32(0);
        w.put_u32(0);
        let err = decode_commands(w.as_slice()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Version);
    }

    #[test]
    fn test_unknown_opcode() {
        let mut writer = CommandWriter::new();
        writer.clear_all().raw(99, 0, &[]);
        let err = decode_commands(&writer.finish()).unwrap_err();
        assert_eq!(err, CommandError::UnknownOpcode { index: 1, opcode: 99 });
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_payload_length_must_match() {
        let mut writer = CommandWriter::new();
        writer.raw(Opcode::SetEntityZ as u32, 1, &[0u8; 8]);
        let err = decode_commands(&writer.finish()).unwrap_err();
        assert!(matches!(err, CommandError::PayloadLength { expected: 4, found: 8, .. }));
    }

    #[test]
    fn test_trailing_bytes() {
        let mut writer = CommandWriter::new();
        writer.clear_all();
        let mut bytes = writer.finish();
        bytes.extend_from_slice(&[1, 2, 3]);
        let err = decode_commands(&bytes).unwrap_err();
        assert_eq!(err, CommandError::TrailingBytes { offset: 32, count: 3 });
    }

    #[test]
    fn test_truncated_payload_length() {
        let mut w = header(1);
        w.put_u32(Opcode::DeleteEntity as u32);
        w.put_u32(1);
        w.put_u32(u32::MAX);
        w.put_u32(0);
        let err = decode_commands(w.as_slice()).unwrap_err();
        assert!(matches!(err, CommandError::Wire(WireError::Truncated { .. })));
    }

    #[test]
    fn test_non_finite_float_rejected() {
        let mut w = header(1);
        w.put_u32(Opcode::SetEntityZ as u32);
        w.put_u32(1);
        w.put_u32(4);
        w.put_u32(0);
        w.put_f32(f32::INFINITY);
        let err = decode_commands(w.as_slice()).unwrap_err();
        assert!(matches!(err, CommandError::Wire(WireError::NonFinite { .. })));
    }

    #[test]
    fn test_huge_count_does_not_preallocate() {
        let w = header(u32::MAX);
        let err = decode_commands(w.as_slice()).unwrap_err();
        assert!(matches!(err, CommandError::Wire(WireError::Truncated { .. })));
    }

    #[test]
    fn test_polyline_count_mismatch() {
        let mut writer = CommandWriter::new();
        let mut payload = ByteWriter::new();
        payload.put_u32(1000);
        put_style(&mut payload, &Style::default());
        writer.raw(Opcode::UpsertPolyline as u32, 1, payload.as_slice());
        let err = decode_commands(&writer.finish()).unwrap_err();
        assert!(matches!(err, CommandError::PayloadLength { .. }));
    }
}
