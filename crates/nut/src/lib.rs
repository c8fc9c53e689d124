//! # nut
//!
//! Builds LXC container images from Dockerfile-style build scripts.
//!
//! A build parses the script into statements, classifies them into
//! [`Directive`]s, and replays them against a container cloned from the
//! base image: commands run inside the container, metadata directives
//! accumulate into a [`Manifest`]. Afterwards, labelled artifacts are
//! copied back to the host and the manifest is written next to the
//! container's rootfs.
//!
//! ```no_run
//! use nut::{Builder, Script};
//! use nut_common::ContainerName;
//! use nut_driver::{DriverConfig, LxcDriver};
//!
//! # async fn example() -> color_eyre::eyre::Result<()> {
//! let script = Script::parse_str("FROM ubuntu\nRUN apt-get update\nCMD [\"bash\"]\n")?;
//! let driver = LxcDriver::new(DriverConfig::default());
//!
//! let mut builder = Builder::new(ContainerName::new("web")?, driver);
//! let manifest = builder.build(&script).await?;
//! println!("{:?}", manifest.entry_point);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod artifact;
pub mod build;
pub mod cli;
pub mod directive;
pub mod exec;
pub mod manifest;
pub mod script;
pub mod staging;
pub mod state;

pub use build::{BuildOptions, Builder, Halted};
pub use directive::Directive;
pub use manifest::Manifest;
pub use script::{Script, Statement};
pub use state::BuildState;
