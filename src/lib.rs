//! Synheart Health Bridge - record translation and bucketing for platform health stores
//!
//! The bridge sits between a permission-gated health store and an app runtime
//! that speaks JSON. Every call follows the same path: wire options → record
//! codec (via the registry) → store request → store response → wire JSON.
//!
//! ## Modules
//!
//! - **Codecs**: per-record-type read, write, aggregate and bucket conversions
//! - **Bucketing**: daily grouping for types the store cannot aggregate natively,
//!   including the sleep-interval merge
//! - **Bridge**: the operation set exposed to the app runtime
//! - **Store**: an in-memory health store for tests, the CLI and host-free use

pub mod bridge;
pub mod bucketing;
pub mod codecs;
pub mod envelope;
pub mod error;
pub mod permissions;
pub mod platform;
pub mod registry;
pub mod store;
pub mod types;
pub mod units;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use bridge::{BridgeConfig, HealthConnectBridge};
pub use envelope::{BucketEnvelope, LocalZone};
pub use error::{BridgeError, WireError};
pub use platform::{HealthStore, HealthStoreProvider, SdkStatus};
pub use registry::{BucketingMode, RecordTypeRegistry};
pub use store::{MemoryStore, MemoryStoreProvider};
pub use types::{Record, RecordType};

// Quantity exports
pub use units::{expand_quantity, QuantityKind};

// Permission exports
pub use permissions::{AccessType, Permission, PermissionLauncher, PermissionResponder};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
