//! STL -> STEP conversion through the FreeCAD command-line interpreter.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::ConversionError;

use super::Converter;

const INPUT_ENV: &str = "OMNI_CONVERT_INPUT";
const OUTPUT_ENV: &str = "OMNI_CONVERT_OUTPUT";
const TOLERANCE_ENV: &str = "OMNI_CONVERT_MESH_TOLERANCE";

// Paths reach the script through the environment, never through string interpolation.
const MESH_TO_STEP_SCRIPT: &str = "\
import os, FreeCAD, Mesh, Part, Import
mesh = Mesh.read(os.environ['OMNI_CONVERT_INPUT'])
shape = Part.Shape()
shape.makeShapeFromMesh(mesh.Topology, float(os.environ['OMNI_CONVERT_MESH_TOLERANCE']))
doc = FreeCAD.newDocument('STLImport')
obj = doc.addObject('Part::Feature', 'MeshShape')
obj.Shape = shape
Import.export([obj], os.environ['OMNI_CONVERT_OUTPUT'])
FreeCAD.closeDocument('STLImport')
";

/// Settings for [`FreecadConverter`].
#[derive(Debug, Clone, PartialEq)]
pub struct FreecadConverterConfig {
    /// FreeCAD command-line binary.
    pub binary: PathBuf,
    /// Sewing tolerance passed to `makeShapeFromMesh`.
    pub mesh_tolerance: f64,
}

impl Default for FreecadConverterConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("freecadcmd"),
            mesh_tolerance: 0.01,
        }
    }
}

/// Runs `freecadcmd -c <script>` per conversion.
///
/// The child is not killed if the caller stops waiting; the tool is opaque.
#[derive(Debug, Clone, Default)]
pub struct FreecadConverter {
    config: FreecadConverterConfig,
}

impl FreecadConverter {
    pub fn new(config: FreecadConverterConfig) -> Self {
        Self { config }
    }

    fn command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        cmd.arg("-c")
            .arg(MESH_TO_STEP_SCRIPT)
            .env(INPUT_ENV, input)
            .env(OUTPUT_ENV, output)
            .env(TOLERANCE_ENV, self.config.mesh_tolerance.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

#[async_trait]
impl Converter for FreecadConverter {
    async fn convert(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        let result = self
            .command(input, output)
            .output()
            .await
            .map_err(|error| ConversionError::Launch {
                message: format!("{}: {error}", self.config.binary.display()),
            })?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let detail = stderr.trim();
            return Err(ConversionError::failed(if detail.is_empty() {
                format!("{} exited with {}", self.config.binary.display(), result.status)
            } else {
                detail.to_string()
            }));
        }
        // freecadcmd can exit 0 after a Python exception; trust only the output file.
        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.is_file() => Ok(()),
            _ => {
                let stdout = String::from_utf8_lossy(&result.stdout);
                let stderr = String::from_utf8_lossy(&result.stderr);
                let tail = [stderr.trim(), stdout.trim()]
                    .into_iter()
                    .find(|s| !s.is_empty())
                    .unwrap_or("no output file produced");
                Err(ConversionError::failed(tail.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_a_launch_error() {
        let converter = FreecadConverter::new(FreecadConverterConfig {
            binary: PathBuf::from("/nonexistent/freecadcmd-for-tests"),
            mesh_tolerance: 0.01,
        });
        let err = converter
            .convert(Path::new("in.stl"), Path::new("out.step"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::Launch { .. }));
    }

    #[test]
    fn command_passes_paths_through_environment() {
        let converter = FreecadConverter::default();
        let cmd = converter.command(Path::new("/up/a.stl"), Path::new("/out/a.step"));
        let std_cmd = cmd.as_std();
        let envs: Vec<_> = std_cmd
            .get_envs()
            .filter_map(|(k, v)| Some((k.to_str()?.to_string(), v?.to_str()?.to_string())))
            .collect();
        assert!(envs.contains(&(INPUT_ENV.to_string(), "/up/a.stl".to_string())));
        assert!(envs.contains(&(OUTPUT_ENV.to_string(), "/out/a.step".to_string())));
        assert!(
            std_cmd
                .get_args()
                .all(|arg| !arg.to_string_lossy().contains("/up/a.stl"))
        );
    }
}
