//! Conversion collaborator: an opaque input-file -> output-file transformation.

mod freecad;

use std::path::Path;

use async_trait::async_trait;

use crate::error::ConversionError;

pub use freecad::{FreecadConverter, FreecadConverterConfig};

/// External transformation invoked by the lifecycle manager.
///
/// On success the output file must exist at `output`. No retries are done by callers.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Convert `input` into `output`.
    async fn convert(&self, input: &Path, output: &Path) -> Result<(), ConversionError>;
}
