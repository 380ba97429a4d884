//! InkFrame Core Library
//!
//! Headless interaction engine for 2D vector documents: entity storage,
//! hit-testing, transform sessions, undo history, change events and
//! binary command and snapshot formats.

pub mod command;
pub mod config;
pub mod digest;
pub mod document;
pub mod entity;
pub mod error;
pub mod events;
pub mod geometry;
pub mod history;
pub mod input;
pub mod pick;
pub mod selection;
pub mod session;
pub mod snap;
pub mod snapshot;
pub mod style;
pub mod text;
pub mod transform_log;
pub mod view;
pub mod wire;

pub use command::{Command, CommandError, CommandWriter, Opcode, decode_commands};
pub use config::{ConfigError, EngineConfig};
pub use digest::DocumentDigest;
pub use document::Document;
pub use entity::{
    DEFAULT_LAYER, EntityFlags, EntityId, EntityKind, EntityRecord, EntityStore, Geometry, Layer,
    LayerFlags, LayerId, NO_ENTITY, RenderDirty, ReorderAction, Rgba, Style, TextGeometry,
};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use events::{ChangeMask, Event, EventKind};
pub use history::History;
pub use input::Modifiers;
pub use pick::{AreaMode, PickMask, PickResult, SubTarget};
pub use selection::{HandleMetrics, SelectMode, Selection};
pub use session::{BeginTransform, CommitOutcome, SessionError, TransformMode};
pub use snapshot::{DocumentMeta, SnapshotError};
pub use style::{SelectionStyleSummary, StyleTarget, TargetSummary, TriState};
pub use text::{GlyphProvider, MonospaceGlyphs};
pub use transform_log::{TransformLog, TransformLogEntry};
pub use view::{ViewProvider, Viewport};
