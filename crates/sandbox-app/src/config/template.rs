//! Project template (`template.json`)
//!
//! Only the preview section is read; unknown keys are ignored.

use std::path::Path;

use serde::{Deserialize, Serialize};

use sandbox_core::prelude::*;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Template {
    pub previews: PreviewsTemplate,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PreviewsTemplate {
    pub enabled: bool,
    #[serde(default)]
    pub web: Option<WebPreview>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WebPreview {
    pub command: String,
}

impl Template {
    /// Command that serves the web preview, if previews are configured
    pub fn web_command(&self) -> Option<&str> {
        self.previews.web.as_ref().map(|web| web.command.as_str())
    }
}

/// Parse a template file; `Ok(None)` when it does not exist
pub fn load_template(path: &Path) -> Result<Option<Template>> {
    if !path.exists() {
        debug!("No template at {:?}", path);
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::config(format!("Failed to read {}: {}", path.display(), e)))?;
    let template = serde_json::from_str(&content)
        .map_err(|e| Error::config(format!("Invalid template {}: {}", path.display(), e)))?;

    debug!("Loaded template from {:?}", path);
    Ok(Some(template))
}
