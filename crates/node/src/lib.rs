//! Library for orchestrating the single-process cluster benchmark node.
//!
//! The node co-locates three subsystems of a replicated-log cluster (the
//! recording archive, the consensus module and the clustered service
//! container) so a benchmark driver can measure an end-to-end clustered
//! workload without a multi-host deployment.
//!
//! The orchestration sequence is strict: compose configuration from one
//! shared context, write the liveness records, reclaim stale on-disk state,
//! launch archive → consensus module → service container, then hold until
//! the termination signal and release everything in reverse order.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod bootstrap;
mod config;
mod echo;
mod error;
mod liveness;
mod node;
mod properties;
mod reclaim;

pub use bootstrap::Bootstrap;
pub use config::{ComposedConfigs, NodeOptions, SharedContext, compose_configs};
pub use echo::EchoService;
pub use error::{Error, ReleaseErrors, ReleaseFailure, Result};
pub use liveness::write_liveness_records;
pub use node::ClusterNode;
pub use properties::{
    CONTROL_CHANNEL_PROP_NAME, CONTROL_STREAM_ID_PROP_NAME, DEFAULT_SNAPSHOT_SIZE, DIR_PROP_NAME,
    Properties, SERVICE_ID_PROP_NAME, SNAPSHOT_SIZE_PROP_NAME,
};
pub use reclaim::reclaim_stale_state;
