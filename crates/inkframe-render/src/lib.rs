//! InkFrame Render Library
//!
//! Turns entity records into flat vertex/index buffers ready for GPU upload.
//! Buffers are rebuilt incrementally from the store's render dirty set.
//! Selection outlines and handles are built separately as overlay primitives.

mod buffer;
pub mod overlay;
pub mod tessellate;

pub use buffer::{RenderBufferBuilder, RenderError, RenderFrame, RenderResult};
pub use overlay::{FLAG_ROTATE, OverlayBuffer, OverlayKind, OverlayPrimitive, OverlayStyle, SelectionOverlay};
pub use tessellate::{ELLIPSE_SEGMENTS, Mesh, SOLID_UV, Vertex, tessellate, vertex_bytes};
