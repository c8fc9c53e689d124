//! # nut-driver
//!
//! The container runtime contract consumed by the nut image builder, and
//! [`LxcDriver`], an implementation backed by the LXC command-line tools.
//!
//! ```no_run
//! use nut_common::ContainerName;
//! use nut_driver::{ContainerDriver, DriverConfig, LxcDriver};
//!
//! # async fn example() -> nut_common::NutResult<()> {
//! let driver = LxcDriver::new(DriverConfig::default());
//! let base = ContainerName::new("ubuntu")?;
//! let name = ContainerName::generate();
//!
//! let handle = driver.clone_and_start(&base, &name, &[]).await?;
//! let rootfs = driver.rootfs(&handle).await?;
//! println!("{}", rootfs.display());
//! driver.destroy(&handle).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod config;
pub mod driver;
pub mod lxc;

pub use config::DriverConfig;
pub use driver::{AttachOptions, ContainerDriver, ContainerHandle, ContainerStatus, VolumeSpec};
pub use lxc::LxcDriver;
