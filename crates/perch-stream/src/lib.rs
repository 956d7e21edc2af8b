//! perch-stream — the camera streaming session manager.
//!
//! Negotiates per-session transport parameters, supervises one
//! transcoder subprocess per active viewing session, and bridges the
//! vendor camera's elementary stream into it. The surrounding vendor
//! client and snapshot service live here too.

pub mod error;
pub mod manager;
pub mod negotiator;
pub mod registry;
pub mod snapshot;
pub mod source;
pub mod supervisor;
pub mod vendor;

pub use error::StreamError;
pub use manager::{SessionEvent, StreamManager};
pub use registry::SessionRegistry;
pub use snapshot::SnapshotService;
pub use source::{StreamSink, StreamSource, TcpStreamSource};
pub use supervisor::TranscoderSettings;
pub use vendor::{TokenStore, VendorClient, VendorError};
