//! Shared types for the aos-replica workspace.
//!
//! Everything that crosses a crate boundary lives here: normalized log
//! [`Message`]s and their [`Tags`], the [`ProcessReplica`] synchronization
//! state, [`Checkpoint`] references, execution results and the resolved
//! [`ProcessEnvironment`].

pub mod env_utils;
pub mod environment;
pub mod message;
pub mod replica;
pub mod result;

pub use environment::{ModuleInfo, ProcessEnvironment, ProcessInfo, LATEST_MODULE};
pub use message::{Message, Tag, Tags};
pub use replica::{
    signed_nonce, BlobCopyError, BootstrapSource, Checkpoint, ProcessReplica, StateBlob,
};
pub use result::{ReplayResult, SpeculativeOutcome};
