//! Process environment resolution.
//!
//! The execution engine receives the process and module transactions
//! alongside every message. Neither lookup is fatal: an unknown process
//! runs with an unresolved environment and module `LATEST`.

use crate::source::ProcessDirectory;
use replica_transport::TransactionNode;
use replica_types::{ModuleInfo, ProcessEnvironment, ProcessInfo, Tags, LATEST_MODULE};
use tracing::{info, warn};

/// Owner address of the relay that spawns processes on behalf of others.
/// Processes it owns report their real owner in `From-Process`.
pub const RELAY_OWNER: &str = "fcoN_xJeisVsPXA-trzVAuIiqO3ydLQxM-L4XbrQKzY";

/// Effective owner of a process transaction.
pub fn effective_owner(node: &TransactionNode, tags: &Tags) -> Option<String> {
    match node.owner.as_deref() {
        Some(RELAY_OWNER) => tags.get("From-Process").map(String::from),
        owner => owner.map(String::from),
    }
}

/// Build the environment of `process_id`.
///
/// A configured module id wins over the process's `Module` tag.
pub async fn resolve_environment(
    directory: &dyn ProcessDirectory,
    process_id: &str,
    configured_module: Option<&str>,
) -> ProcessEnvironment {
    let mut env = match directory.transaction(process_id).await {
        Ok(Some(node)) => {
            let tags = Tags::new(node.tags.clone());
            let owner = effective_owner(&node, &tags);
            ProcessEnvironment {
                process: ProcessInfo {
                    id: process_id.to_string(),
                    owner,
                    tags,
                },
                module: ModuleInfo::default(),
            }
        }
        Ok(None) => {
            warn!(process_id, "process transaction not found, using default environment");
            ProcessEnvironment::unresolved(process_id)
        }
        Err(e) => {
            warn!(process_id, error = %e, "process lookup failed, using default environment");
            ProcessEnvironment::unresolved(process_id)
        }
    };

    let discovered = env.process.tags.get("Module").map(String::from);
    let module_id = match configured_module.filter(|m| !m.is_empty()) {
        Some(configured) => configured.to_string(),
        None => match discovered {
            Some(found) => found,
            None => {
                warn!(process_id, "module id unknown, falling back to {LATEST_MODULE}");
                LATEST_MODULE.to_string()
            }
        },
    };

    env.module = if module_id == LATEST_MODULE {
        ModuleInfo {
            id: module_id,
            ..ModuleInfo::default()
        }
    } else {
        resolve_module(directory, &module_id).await
    };
    info!(
        process_id,
        module_id = env.module_id(),
        owner = env.process.owner.as_deref().unwrap_or("<unknown>"),
        "process environment resolved"
    );
    env
}

async fn resolve_module(directory: &dyn ProcessDirectory, module_id: &str) -> ModuleInfo {
    match directory.transaction(module_id).await {
        Ok(Some(node)) => ModuleInfo {
            id: module_id.to_string(),
            owner: node.owner,
            tags: Tags::new(node.tags),
        },
        Ok(None) => {
            warn!(module_id, "module transaction not found");
            ModuleInfo {
                id: module_id.to_string(),
                ..ModuleInfo::default()
            }
        }
        Err(e) => {
            warn!(module_id, error = %e, "module lookup failed");
            ModuleInfo {
                id: module_id.to_string(),
                ..ModuleInfo::default()
            }
        }
    }
}
