//! Shared utilities: clocks, error policy, size parsing and test ports.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod clock;
pub mod error_policy;
pub mod port_allocator;
pub mod size;

pub use clock::{EpochClock, SharedEpochClock, SystemEpochClock};
pub use error_policy::{ErrorHandler, ErrorPolicy, fatal_error_policy};
pub use port_allocator::{allocate_port, is_port_available};
pub use size::parse_size;
