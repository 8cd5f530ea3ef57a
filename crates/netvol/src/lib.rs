//! # netvol
//!
//! Reference-counted network share mounts for container volumes.
//!
//! Many containers can share one physically mounted CIFS share or EFS export.
//! The [`VolumeDriver`] counts users per volume, mounts on the first and
//! unmounts after the last, persists its registry after every change, and
//! reconciles that registry with the host mount table at startup.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use netvol::backend::CifsBackend;
//! use netvol::config::{CifsConfig, DriverConfig};
//! use netvol::exec::SystemRunner;
//! use netvol::registry::Options;
//! use netvol::VolumeDriver;
//!
//! # fn example() -> netvol_common::NetvolResult<()> {
//! let backend = CifsBackend::new(&CifsConfig::default());
//! let driver = VolumeDriver::new(
//!     DriverConfig::default().with_root("/mnt/netshare"),
//!     Box::new(backend),
//!     Arc::new(SystemRunner),
//! )?;
//!
//! let hostdir = driver.mount("fileserver/projects", &Options::new())?;
//! println!("mounted at {}", hostdir.display());
//! driver.unmount("fileserver/projects")?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod backend;
pub mod cli;
pub mod config;
pub mod driver;
pub mod exec;
pub mod reconcile;
pub mod registry;
pub mod store;

#[cfg(test)]
mod testing;

pub use driver::VolumeDriver;
pub use registry::{MountEntry, MountRegistry, Options, VolumeInfo};
