//! Network transport for aos-replica.
//!
//! Every client here is a thin blocking wrapper around a [`ureq::Agent`]
//! with explicit timeouts. They return raw, unvalidated payloads; turning
//! them into domain values is the job of `replica-core`.
//!
//! | client | endpoint |
//! |--------|----------|
//! | [`SequencerClient`] | ordered message log and head nonce |
//! | [`GraphQLClient`] | checkpoint registry, transaction tags, process metadata |
//! | [`GatewayClient`] | compressed checkpoint blobs |
//! | [`StateClient`] | live process state and its headers |
//!
//! # Example
//!
//! ```ignore
//! use replica_transport::{LogQuery, SequencerClient};
//!
//! let su = SequencerClient::new("https://su-router.ao-testnet.xyz");
//! let page = su.fetch_log("PROCESS_ID", &LogQuery::from_nonce(0))?;
//! println!("{} entries", page.entries.len());
//! ```

pub mod error;
pub mod gateway;
pub mod graphql;
pub mod http;
pub mod network;
pub mod sequencer;
pub mod state;

pub use error::TransportError;
pub use gateway::GatewayClient;
pub use graphql::{CheckpointEntry, CheckpointPage, GraphQLClient, PageInfo, TransactionNode};
pub use network::Endpoints;
pub use sequencer::{LogPage, LogQuery, RawAssignment, RawEntry, RawMessage, SequencerClient};
pub use state::{LiveStateHeaders, RawLiveState, StateClient};
