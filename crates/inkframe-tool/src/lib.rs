//! InkFrame command line front end.
//!
//! Every subcommand works on snapshot files and prints a JSON report on stdout.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use inkframe_core::{
    AreaMode, ConfigError, Document, EngineConfig, EngineError, Event, EntityId, Layer, PickMask,
    PickResult,
};
use inkframe_render::{RenderBufferBuilder, RenderError};
use kurbo::{Point, Rect};
use log::{debug, info};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", .path.display())]
    Engine {
        path: PathBuf,
        #[source]
        source: EngineError,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("failed to encode report: {0}")]
    Report(#[from] serde_json::Error),
}

pub type ToolResult<T> = Result<T, ToolError>;

#[derive(Debug, Parser)]
#[command(name = "inkframe")]
#[command(about = "Inspect and edit inkframe document snapshots")]
pub struct Cli {
    /// Engine config file (defaults to $INKFRAME_CONFIG, then built-in defaults)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: ToolCommand,
}

#[derive(Debug, Subcommand)]
pub enum ToolCommand {
    /// Create an empty snapshot
    New {
        output: PathBuf,
        #[arg(short, long, default_value = "Untitled")]
        name: String,
    },
    /// Summarize a snapshot
    Info { snapshot: PathBuf },
    /// Apply command buffers to a snapshot, in order, and save the result
    Apply {
        snapshot: PathBuf,
        #[arg(required = true)]
        commands: Vec<PathBuf>,
        /// Where to write the result (defaults to overwriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Build render buffers and optionally dump the raw vertex and index bytes
    Render {
        snapshot: PathBuf,
        #[arg(long)]
        vertices: Option<PathBuf>,
        #[arg(long)]
        indices: Option<PathBuf>,
    },
    /// Hit-test a world point
    Pick {
        snapshot: PathBuf,
        x: f64,
        y: f64,
        /// World-space tolerance
        #[arg(short, long, default_value_t = 1.0)]
        tolerance: f64,
        /// Also report resize and rotate handles
        #[arg(long)]
        handles: bool,
    },
    /// List entities inside or touching a world rectangle
    Area {
        snapshot: PathBuf,
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
        #[arg(short, long, value_enum, default_value = "window")]
        mode: AreaArg,
    },
    /// Print the effective engine config
    Config,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum AreaArg {
    Window,
    Crossing,
}

impl From<AreaArg> for AreaMode {
    fn from(arg: AreaArg) -> Self {
        match arg {
            AreaArg::Window => AreaMode::Window,
            AreaArg::Crossing => AreaMode::Crossing,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InfoReport {
    pub id: String,
    pub name: String,
    pub entities: usize,
    pub kinds: BTreeMap<String, usize>,
    pub layers: Vec<Layer>,
    pub next_id: EntityId,
    pub selection: Vec<EntityId>,
    pub bounds: Option<[f64; 4]>,
}

#[derive(Debug, Serialize)]
pub struct ApplyOutcome {
    pub file: PathBuf,
    pub commands: usize,
    pub recorded: bool,
}

#[derive(Debug, Serialize)]
pub struct ApplyReport {
    pub batches: Vec<ApplyOutcome>,
    pub events: Vec<Event>,
    pub entities: usize,
    pub output: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct RenderReport {
    pub vertices: usize,
    pub indices: usize,
    pub triangles: usize,
    pub vertex_bytes: usize,
    pub generation: u64,
}

fn read(path: &Path) -> ToolResult<Vec<u8>> {
    fs::read(path).map_err(|source| ToolError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn write(path: &Path, bytes: &[u8]) -> ToolResult<()> {
    fs::write(path, bytes).map_err(|source| ToolError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn engine_error(path: &Path) -> impl FnOnce(EngineError) -> ToolError + '_ {
    move |source| ToolError::Engine {
        path: path.to_path_buf(),
        source,
    }
}

/// Load a snapshot file into a fresh document.
pub fn open_document(path: &Path, config: &EngineConfig) -> ToolResult<Document> {
    let bytes = read(path)?;
    let mut doc = Document::new(config.clone());
    doc.load_snapshot(&bytes).map_err(engine_error(path))?;
    debug!("Opened {} ({} entities)", path.display(), doc.store().len());
    Ok(doc)
}

pub fn resolve_config(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    match path {
        Some(path) => EngineConfig::from_file(path),
        None => EngineConfig::discover(),
    }
}

pub fn new_snapshot(output: &Path, name: &str, config: &EngineConfig) -> ToolResult<()> {
    let mut doc = Document::new(config.clone());
    doc.set_name(name);
    let bytes = doc.save_snapshot().map_err(engine_error(output))?;
    write(output, &bytes)?;
    info!("Created {} \"{name}\"", output.display());
    Ok(())
}

pub fn info(path: &Path, config: &EngineConfig) -> ToolResult<InfoReport> {
    let doc = open_document(path, config)?;
    let store = doc.store();
    let mut kinds = BTreeMap::new();
    let mut bounds: Option<Rect> = None;
    for record in store.iter_ordered() {
        *kinds.entry(format!("{:?}", record.kind())).or_insert(0) += 1;
        let aabb = record.aabb();
        bounds = Some(bounds.map_or(aabb, |b| b.union(aabb)));
    }
    Ok(InfoReport {
        id: doc.meta().id.to_string(),
        name: doc.meta().name.clone(),
        entities: store.len(),
        kinds,
        layers: store.layers().cloned().collect(),
        next_id: store.next_id(),
        selection: doc.selection().ids().to_vec(),
        bounds: bounds.map(|b| [b.x0, b.y0, b.x1, b.y1]),
    })
}

/// Apply every command file to the snapshot. A rejected batch aborts without writing.
pub fn apply(
    snapshot: &Path,
    commands: &[PathBuf],
    output: Option<&Path>,
    config: &EngineConfig,
) -> ToolResult<ApplyReport> {
    let mut doc = open_document(snapshot, config)?;
    let mut events = Vec::new();
    doc.drain_events(&mut events);
    events.clear();

    let mut batches = Vec::with_capacity(commands.len());
    for file in commands {
        let bytes = read(file)?;
        let report = doc.apply_commands(&bytes).map_err(engine_error(file))?;
        debug!("{}: {} commands applied", file.display(), report.commands);
        batches.push(ApplyOutcome {
            file: file.clone(),
            commands: report.commands,
            recorded: report.recorded,
        });
    }
    doc.drain_events(&mut events);

    let output = output.unwrap_or(snapshot).to_path_buf();
    let bytes = doc.save_snapshot().map_err(engine_error(&output))?;
    write(&output, &bytes)?;
    info!("Wrote {} ({} entities)", output.display(), doc.store().len());
    Ok(ApplyReport {
        batches,
        events,
        entities: doc.store().len(),
        output,
    })
}

pub fn render(
    snapshot: &Path,
    vertices_out: Option<&Path>,
    indices_out: Option<&Path>,
    config: &EngineConfig,
) -> ToolResult<RenderReport> {
    let mut doc = open_document(snapshot, config)?;
    let dirty = doc.take_render_dirty();
    let mut builder = RenderBufferBuilder::new();
    let frame = builder.rebuild(doc.store(), &dirty, doc.glyphs())?;
    let vertex_bytes = inkframe_render::vertex_bytes(frame.vertices);
    if let Some(path) = vertices_out {
        write(path, vertex_bytes)?;
    }
    if let Some(path) = indices_out {
        let bytes: Vec<u8> = frame.indices.iter().flat_map(|i| i.to_le_bytes()).collect();
        write(path, &bytes)?;
    }
    Ok(RenderReport {
        vertices: frame.vertices.len(),
        indices: frame.indices.len(),
        triangles: frame.indices.len() / 3,
        vertex_bytes: vertex_bytes.len(),
        generation: frame.generation,
    })
}

pub fn pick(
    snapshot: &Path,
    point: Point,
    tolerance: f64,
    mask: PickMask,
    config: &EngineConfig,
) -> ToolResult<PickResult> {
    let mut doc = open_document(snapshot, config)?;
    Ok(doc.pick(point, tolerance, mask))
}

fn pick_mask(handles: bool) -> PickMask {
    let mask = PickMask::BODY | PickMask::EDGE | PickMask::VERTEX;
    if handles { mask | PickMask::HANDLES } else { mask }
}

pub fn area(snapshot: &Path, rect: Rect, mode: AreaMode, config: &EngineConfig) -> ToolResult<Vec<EntityId>> {
    let mut doc = open_document(snapshot, config)?;
    Ok(doc.pick_area(rect, mode))
}

/// Run one parsed invocation and return the JSON report.
pub fn run(cli: &Cli) -> ToolResult<String> {
    let config = resolve_config(cli.config.as_deref())?;
    let json = match &cli.command {
        ToolCommand::New { output, name } => {
            new_snapshot(output, name, &config)?;
            serde_json::json!({ "created": output }).to_string()
        }
        ToolCommand::Info { snapshot } => serde_json::to_string_pretty(&info(snapshot, &config)?)?,
        ToolCommand::Apply {
            snapshot,
            commands,
            output,
        } => serde_json::to_string_pretty(&apply(snapshot, commands, output.as_deref(), &config)?)?,
        ToolCommand::Render {
            snapshot,
            vertices,
            indices,
        } => serde_json::to_string_pretty(&render(
            snapshot,
            vertices.as_deref(),
            indices.as_deref(),
            &config,
        )?)?,
        ToolCommand::Pick {
            snapshot,
            x,
            y,
            tolerance,
            handles,
        } => serde_json::to_string_pretty(&pick(
            snapshot,
            Point::new(*x, *y),
            *tolerance,
            pick_mask(*handles),
            &config,
        )?)?,
        ToolCommand::Area {
            snapshot,
            x0,
            y0,
            x1,
            y1,
            mode,
        } => serde_json::to_string(&area(
            snapshot,
            Rect::new(*x0, *y0, *x1, *y1),
            (*mode).into(),
            &config,
        )?)?,
        ToolCommand::Config => config.to_json()?,
    };
    Ok(json)
}
