//! nut CLI.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use nut_common::{ContainerName, NutPaths};
use nut_driver::{DriverConfig, LxcDriver, VolumeSpec};

use crate::build::{BuildOptions, Builder};
use crate::script::Script;

/// nut - build LXC images from Dockerfiles
#[derive(Parser)]
#[command(name = "nut")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// LXC container root
    #[arg(
        long,
        global = true,
        env = "NUT_LXC_PATH",
        default_value = "/var/lib/lxc"
    )]
    pub lxc_path: PathBuf,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// nut commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Build an image
    Build {
        /// Path to the build script
        #[arg(short, long, default_value = "Dockerfile")]
        file: PathBuf,

        /// Name of the container to build (random if omitted)
        #[arg(short, long)]
        name: Option<ContainerName>,

        /// Bind mount a host directory into the build container
        #[arg(long = "volume", value_name = "HOST:CONTAINER")]
        volumes: Vec<VolumeSpec>,

        /// Directory receiving extracted artifacts
        #[arg(long, default_value = ".")]
        artifact_dir: PathBuf,

        /// Clone the base container as a snapshot
        #[arg(long)]
        snapshot: bool,

        /// Backing store for the clone (dir, overlay, btrfs, ...)
        #[arg(long, value_name = "STORE")]
        backing_store: Option<String>,

        /// Export the built container to this archive
        #[arg(long)]
        export: Option<PathBuf>,

        /// Run the export under sudo
        #[arg(long, requires = "export")]
        sudo: bool,

        /// Stop the container after building
        #[arg(long)]
        stop: bool,

        /// Destroy the container after building, even on failure
        #[arg(long, conflicts_with = "stop")]
        ephemeral: bool,
    },

    /// Parse a build script and list its directives
    Parse {
        /// Path to the build script
        #[arg(short, long, default_value = "Dockerfile")]
        file: PathBuf,
    },
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Build {
                file,
                name,
                volumes,
                artifact_dir,
                snapshot,
                backing_store,
                export,
                sudo,
                stop,
                ephemeral,
            } => {
                let script = Script::from_file(&file)?;
                let name = name.unwrap_or_else(ContainerName::generate);
                tracing::info!(file = %file.display(), container = %name, "Building image");

                let mut config = DriverConfig::default().with_lxc_path(&self.lxc_path);
                if snapshot {
                    config = config.with_snapshot();
                }
                if let Some(store) = backing_store {
                    config = config.with_backing_store(store);
                }

                let options = BuildOptions {
                    volumes,
                    artifact_dir,
                    paths: NutPaths::with_lxc_path(&self.lxc_path),
                };

                let mut builder = Builder::with_options(name, LxcDriver::new(config), options);
                let manifest = match builder.build(&script).await {
                    Ok(manifest) => manifest,
                    Err(e) => {
                        let created = builder.state().is_some_and(|s| s.container.is_some());
                        if ephemeral && created {
                            if let Err(destroy_err) = builder.destroy().await {
                                tracing::error!(error = %destroy_err, "Failed to destroy container");
                            }
                        }
                        return Err(e.into());
                    }
                };

                if let Some(archive) = &export {
                    builder.stop().await?;
                    builder.export(archive, sudo).await?;
                }
                if ephemeral {
                    builder.destroy().await?;
                } else if stop {
                    builder.stop().await?;
                }

                println!("\nBuild complete!");
                println!("  Container:  {}", builder.name());
                println!("  Env:        {}", manifest.env.join(" "));
                println!("  Workdir:    {}", manifest.work_dir.as_deref().unwrap_or("-"));
                println!("  Entrypoint: {}", manifest.entry_point.join(" "));
                if let Some(archive) = export {
                    println!("  Exported:   {}", archive.display());
                }

                Ok(())
            }

            Commands::Parse { file } => {
                let script = Script::from_file(&file)?;
                let directives = script.directives()?;

                for (statement, directive) in script.statements().iter().zip(&directives) {
                    println!(
                        "{:>4}  {:<10} {}",
                        statement.line(),
                        directive.keyword(),
                        statement.args().join(" ")
                    );
                }

                Ok(())
            }
        }
    }
}
