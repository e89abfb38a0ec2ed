//! Core of the measure-saver ingestion service.
//!
//! An upload travels through three stages, each in its own module:
//!
//! 1. [`model`] decodes the JSON body into a [`MeasurementPayload`].
//! 2. [`validate`] checks it against [`REQUIRED_FIELDS`] and produces a typed
//!    [`Measurement`].
//! 3. [`store`] persists it through the [`MeasurementStore`] trait.
//!
//! [`keys`] loads the static API key allow-list used by the HTTP gate. The HTTP
//! server itself lives in the `measure-saver-server` crate.
//!
//! ```rust
//! use measure_saver::{MeasurementPayload, validate};
//!
//! let payload = MeasurementPayload::decode(
//!     br#"{"browserID":"b","download":0,"upload":0,"latency":0}"#,
//! )?;
//! let measurement = validate(payload)?;
//! assert_eq!(measurement.latency, 0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod keys;
pub mod model;
pub mod store;
pub mod validate;

pub use keys::{AllowedKeys, KeyFileError, parse_keys};
pub use model::{ClientInfo, DecodeError, Measurement, MeasurementPayload, Results, ServerInfo};
#[cfg(feature = "sqlite")]
pub use store::SqliteStore;
pub use store::{MeasurementStore, MemoryStore, StoreError, StoreResult};
pub use validate::{FieldKind, FieldRule, REQUIRED_FIELDS, ValidationError, Violation, validate};
