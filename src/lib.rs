pub mod authority;
pub mod debug;
pub mod dirty;
pub mod error;
pub mod protocol;
pub mod rate_limit;
pub mod snapshot;
pub mod sync;
pub mod timesync;
pub mod transform;
pub mod transport;

pub use transform::TransformState;

pub use snapshot::{Snapshot, SnapshotBuffer};

pub use timesync::{TimeSync, TimeSyncConfig};

pub use dirty::{DirtyConfig, DirtyDetector};

pub use authority::{AuthorityMode, AuthorityReconciler};

pub use protocol::{Channel, EntityId, Message, MessageHeader, MessagePayload, Reliability};

pub use transport::{MemoryTransport, Transport};

pub use rate_limit::{SendRateLimiter, SendRateStats};

pub use error::{Result, SyncError};

pub use sync::{
    ClientSync, ClientSyncStats, ServerSync, ServerSyncStats, SyncConfig, SyncEvent,
};

pub use debug::{init_debug_mode, is_debug_enabled, is_trace_enabled, log_message, message_summary};
