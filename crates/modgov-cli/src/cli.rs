use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "modgov", about = "In-process module governance kernel", version)]
pub struct Cli {
    /// Run with dev-mode permission bypass (missing grants are logged and
    /// allowed rather than denied).
    #[arg(long, env = "MODGOV_DEV_MODE", global = true)]
    pub dev_mode: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Install a module from a manifest.yml + source directory.
    Install {
        /// Directory containing manifest.yml (and, for a real loader, the
        /// module's code). The local runtime only reads the manifest.
        dir: PathBuf,
    },

    /// Deploy a module version as a canary alongside the current default.
    DeployCanary {
        dir: PathBuf,
        /// Percentage of traffic routed to the canary, 0-100.
        #[arg(long, default_value_t = 10)]
        percent: u8,
    },

    /// Re-install a module from its stored source under a fresh version.
    Reload {
        module_id: String,
    },

    /// Uninstall a module and reclaim its resources.
    Uninstall {
        module_id: String,
    },

    /// Invoke a service by its fully-qualified service id (`module:short`).
    Invoke {
        fqsid: String,
        /// Caller module id to present for permission checks.
        #[arg(long, default_value = "__host__")]
        caller: String,
    },

    /// List installed modules.
    List,
}
