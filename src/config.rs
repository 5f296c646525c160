//! Import options.
//!
//! Options are plain data, authored as JSON the same way clips are, and passed
//! explicitly to the stages that need them.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportOptions {
    /// User scale applied on top of the per-game unit scale
    pub scale_factor: f32,
    pub import_skeleton: bool,
    /// Flag bones whose head sits on the parent's tail as connected
    pub skeleton_auto_connect: bool,
    /// Load every clip listed in the animation index after the model
    pub import_animations: bool,
    /// Top-level folder names that mark the root of a game data tree, in
    /// priority order
    pub project_root_markers: Vec<String>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            scale_factor: 1.0,
            import_skeleton: true,
            skeleton_auto_connect: true,
            import_animations: false,
            project_root_markers: vec![
                "Objects".to_string(),
                "Levels".to_string(),
                "Effects".to_string(),
            ],
        }
    }
}

impl ImportOptions {
    /// Parse from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Convert to JSON string
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
