//! Process and module metadata handed to the execution engine.

use crate::message::Tags;
use serde::{Deserialize, Serialize};

/// Module id used when none is configured or discoverable.
pub const LATEST_MODULE: &str = "LATEST";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub id: String,
    /// Effective owner; `None` when the process transaction was not found.
    pub owner: Option<String>,
    pub tags: Tags,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    pub id: String,
    pub owner: Option<String>,
    pub tags: Tags,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessEnvironment {
    pub process: ProcessInfo,
    pub module: ModuleInfo,
}

impl ProcessEnvironment {
    /// Environment for a process whose metadata could not be resolved.
    pub fn unresolved(process_id: impl Into<String>) -> Self {
        Self {
            process: ProcessInfo {
                id: process_id.into(),
                ..ProcessInfo::default()
            },
            module: ModuleInfo {
                id: LATEST_MODULE.to_string(),
                ..ModuleInfo::default()
            },
        }
    }

    pub fn process_id(&self) -> &str {
        &self.process.id
    }

    pub fn module_id(&self) -> &str {
        &self.module.id
    }

    /// Override the module id, e.g. from configuration.
    pub fn with_module_id(mut self, module_id: impl Into<String>) -> Self {
        self.module.id = module_id.into();
        self
    }
}
