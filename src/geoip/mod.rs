//! GeoIP database lifecycle.
//!
//! This module owns everything between a database file and a lookup result:
//! opening MaxMind databases, downloading fresh editions, hot-swapping the
//! open handle on a timer, and sharing one state per database path across
//! handler instances.

mod extract;
mod fetch;
mod pool;
mod reader;
mod scheduler;
mod state;
mod types;

// Re-export public API
pub use fetch::{edition_from_path, DatabaseFetcher, FetchRequest, MaxMindFetcher};
pub use pool::{InstancePool, PoolMember};
pub use reader::{DatabaseHandle, DatabaseReader, MaxMindReader};
pub use scheduler::RefreshAction;
pub use state::SharedState;
pub use types::{DatabaseStatus, HandleMetadata, Lookup, Record, ReloadOutcome, StatusReport};
