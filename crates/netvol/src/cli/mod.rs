//! CLI command definitions and handlers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};

use crate::backend::metadata::METADATA_ENDPOINT;
use crate::backend::{Backend, CifsBackend, Credentials, Ec2Metadata, EfsBackend};
use crate::config::{CifsConfig, DriverConfig, EfsConfig};
use crate::driver::VolumeDriver;
use crate::exec::{CommandRunner, SystemRunner};
use crate::registry::Options;

/// netvol - shared network mounts for container volumes
#[derive(Parser, Debug)]
#[command(name = "netvol")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Root directory volumes are mounted under
    #[arg(
        long,
        global = true,
        env = "NETVOL_ROOT",
        default_value = "/var/lib/docker-volumes/netshare"
    )]
    pub basedir: PathBuf,

    /// Registry snapshot file
    #[arg(
        long,
        global = true,
        env = "NETVOL_SNAPSHOT",
        default_value = "/var/lib/netvol/mounts.json"
    )]
    pub mounts_file: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// The backend to use.
    #[command(subcommand)]
    pub backend: BackendCommand,
}

/// Protocol backends.
#[derive(Subcommand, Debug)]
pub enum BackendCommand {
    /// CIFS/SMB shares
    Cifs {
        /// Default username
        #[arg(long, env = "NETVOL_CIFS_USERNAME")]
        username: Option<String>,

        /// Default password
        #[arg(long, env = "NETVOL_CIFS_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Default domain
        #[arg(long, env = "NETVOL_CIFS_DOMAIN")]
        domain: Option<String>,

        /// Default security mode
        #[arg(long, env = "NETVOL_CIFS_SECURITY")]
        security: Option<String>,

        /// Directory containing the .netrc credentials file (default: $HOME)
        #[arg(long, env = "NETVOL_NETRC")]
        netrc: Option<PathBuf>,

        /// Operation to perform.
        #[command(subcommand)]
        op: Operation,
    },

    /// AWS EFS exports over NFSv4
    Efs {
        /// Availability zone (default: from instance metadata)
        #[arg(long, env = "NETVOL_EFS_AZ")]
        az: Option<String>,

        /// Mount by export id instead of resolving the zonal hostname
        #[arg(long)]
        noresolve: bool,

        /// Nameserver used for resolution (ip or ip:port)
        #[arg(long, env = "NETVOL_EFS_DNS")]
        dns: Option<String>,

        /// Seconds to cache resolved addresses (default: forever)
        #[arg(long)]
        dns_ttl: Option<u64>,

        /// Instance metadata endpoint
        #[arg(long, env = "NETVOL_METADATA_ENDPOINT", default_value = METADATA_ENDPOINT)]
        metadata_endpoint: String,

        /// Operation to perform.
        #[command(subcommand)]
        op: Operation,
    },
}

/// Volume operations.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Register a managed volume
    Create {
        /// Volume name
        name: String,

        /// Volume option as key=value
        #[arg(short = 'o', long = "opt", value_parser = parse_option)]
        options: Vec<(String, String)>,
    },

    /// Remove an idle volume
    Remove {
        /// Volume name
        name: String,
    },

    /// Mount a volume, or add a user to an existing mount
    Mount {
        /// Volume name
        name: String,

        /// Volume option as key=value
        #[arg(short = 'o', long = "opt", value_parser = parse_option)]
        options: Vec<(String, String)>,
    },

    /// Release a volume, unmounting it after the last user
    Unmount {
        /// Volume name
        name: String,
    },

    /// Print the host directory of a volume
    Path {
        /// Volume name
        name: String,
    },

    /// Show a volume as JSON
    Get {
        /// Volume name
        name: String,
    },

    /// List volumes as JSON
    List,
}

fn parse_option(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

impl Cli {
    /// Build the driver for the selected backend and run the operation.
    pub fn execute(self) -> Result<()> {
        let config = DriverConfig::default()
            .with_root(self.basedir)
            .with_snapshot(self.mounts_file);
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);

        let (backend, op) = match self.backend {
            BackendCommand::Cifs {
                username,
                password,
                domain,
                security,
                netrc,
                op,
            } => {
                let cifs = CifsConfig {
                    defaults: Credentials::new(username, password, domain, security),
                    netrc_dir: netrc,
                };
                let backend: Box<dyn Backend> = Box::new(CifsBackend::new(&cifs));
                (backend, op)
            }
            BackendCommand::Efs {
                az,
                noresolve,
                dns,
                dns_ttl,
                metadata_endpoint,
                op,
            } => {
                let efs = EfsConfig {
                    availability_zone: az,
                    resolve: !noresolve,
                    nameserver: dns,
                    dns_cache_ttl: dns_ttl.map(Duration::from_secs),
                };
                let metadata = Ec2Metadata::default().with_endpoint(metadata_endpoint);
                let backend: Box<dyn Backend> = Box::new(EfsBackend::new(&efs, &metadata)?);
                (backend, op)
            }
        };

        let driver = VolumeDriver::new(config, backend, runner)?;
        run_operation(&driver, op)
    }
}

fn run_operation(driver: &VolumeDriver, op: Operation) -> Result<()> {
    match op {
        Operation::Create { name, options } => {
            driver.create(&name, &options.into_iter().collect::<Options>())?;
        }
        Operation::Remove { name } => driver.remove(&name)?,
        Operation::Mount { name, options } => {
            let hostdir = driver.mount(&name, &options.into_iter().collect::<Options>())?;
            println!("{}", hostdir.display());
        }
        Operation::Unmount { name } => driver.unmount(&name)?,
        Operation::Path { name } => println!("{}", driver.path(&name)?.display()),
        Operation::Get { name } => {
            let info = driver
                .get(&name)
                .ok_or_else(|| eyre!("Volume not found: {name}"))?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Operation::List => println!("{}", serde_json::to_string_pretty(&driver.list())?),
    }
    Ok(())
}
