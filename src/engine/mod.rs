//! Interchangeable script engine backends.

pub mod headless;
pub mod quickjs;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::binding::{ScriptEngine, ScriptError};
use crate::context::HostCallbacks;
use crate::foundation::SurfaceId;

pub use headless::HeadlessEngine;
pub use quickjs::QuickJsEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    #[default]
    Quickjs,
    Headless,
}

/// Build the backend selected by `kind` for one surface.
pub fn create(
    kind: EngineKind,
    surface: SurfaceId,
    callbacks: Arc<HostCallbacks>,
    max_pending_jobs: usize,
) -> Result<Box<dyn ScriptEngine>, ScriptError> {
    match kind {
        EngineKind::Quickjs => Ok(Box::new(QuickJsEngine::new(
            surface,
            callbacks,
            max_pending_jobs,
        )?)),
        EngineKind::Headless => Ok(Box::new(HeadlessEngine::new())),
    }
}
