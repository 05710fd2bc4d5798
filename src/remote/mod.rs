//! Pasqal cloud backends.
//!
//! [`CloudClient`] speaks the cloud's REST API and [`RemoteBackend`] puts
//! it behind the [`Backend`](crate::backend::Backend) trait for the cloud
//! emulators and the QPU.

mod api;
mod backend;
mod error;

pub use api::{Batch, CloudClient, CloudJob, CloudStatus, EmulatorType, JobSpec};
pub use backend::{DEFAULT_DEVICE, RemoteBackend};
pub use error::{CloudError, CloudResult};
