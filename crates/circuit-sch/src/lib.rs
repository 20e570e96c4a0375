//! Schematic drawing for circuit snapshots.

pub mod error;
pub mod request;
pub mod svg;
pub mod symbol;

use std::fs;
use std::path::{Path, PathBuf};

use circuit_core::{CircuitId, Snapshot};
use log::info;

pub use error::RenderError;
pub use request::{schematic_request, Placement, SchematicRequest};
pub use svg::SvgRenderer;
pub use symbol::Symbol;

/// Something that can turn a [`SchematicRequest`] into a file.
pub trait Renderer {
    /// Render to `request.output` and return the path written.
    fn render(&self, request: &SchematicRequest) -> anyhow::Result<PathBuf>;
}

impl<R: Renderer + ?Sized> Renderer for &R {
    fn render(&self, request: &SchematicRequest) -> anyhow::Result<PathBuf> {
        (**self).render(request)
    }
}

/// Draw `snapshot` to `output` with `renderer`.
///
/// Components without a dedicated symbol are drawn as placeholders rather
/// than failing the whole drawing.
pub fn draw(
    snapshot: &Snapshot,
    title: Option<&str>,
    output: impl Into<PathBuf>,
    renderer: &dyn Renderer,
) -> Result<PathBuf, RenderError> {
    let request = schematic_request(snapshot, title, output);
    if let Some(parent) = request.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    info!(
        "Drawing circuit {} v{} ({} components) to {}",
        snapshot.circuit_id,
        snapshot.version,
        snapshot.len(),
        request.output.display()
    );
    renderer
        .render(&request)
        .map_err(|e| RenderError::Engine {
            message: format!("{e:#}"),
        })
}

/// `{dir}/circuit_{id}_v{version}.{ext}`
pub fn default_output_path(dir: &Path, circuit_id: CircuitId, version: usize, ext: &str) -> PathBuf {
    dir.join(format!("circuit_{circuit_id}_v{version}.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("schematics"), CircuitId(3), 2, "svg"),
            PathBuf::from("schematics/circuit_3_v2.svg")
        );
    }
}
