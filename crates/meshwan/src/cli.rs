//! Clap derive structures for the `meshwan` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// meshwan -- control plane for IPsec overlays
#[derive(Debug, Parser)]
#[command(
    name = "meshwan",
    version,
    about = "Manage IPsec overlays of hubs and edge devices",
    long_about = "Declares overlays, crypto proposals, address ranges, hubs and devices,\n\
        and drives certificate issuance, cluster registration and tunnel\n\
        deployment through the resource sync service.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Overlay the command operates on
    #[arg(long, short = 'O', env = "MESHWAN_OVERLAY", global = true)]
    pub overlay: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "MESHWAN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// State file (overrides `state_path` from the config)
    #[arg(long, global = true)]
    pub state: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "MESHWAN_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format on stderr
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage overlays and their CA
    #[command(alias = "ov")]
    Overlay(OverlayArgs),

    /// Manage crypto proposals of an overlay
    #[command(alias = "prop")]
    Proposal(ProposalArgs),

    /// Manage overlay IP ranges and allocations
    #[command(alias = "ipr")]
    Iprange(IpRangeArgs),

    /// Manage hubs
    Hub(HubArgs),

    /// Manage edge devices
    #[command(alias = "dev")]
    Device(DeviceArgs),

    /// Link devices to hubs
    HubDevice(HubDeviceArgs),

    /// Inspect and tear down tunnels
    #[command(alias = "conn")]
    Connection(ConnectionArgs),

    /// Manage certificates
    Cert(CertArgs),

    /// Resume pending registrations and keep polling until interrupted
    Watch,

    /// Inspect the configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  OVERLAYS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct OverlayArgs {
    #[command(subcommand)]
    pub command: OverlayCommand,
}

#[derive(Debug, Subcommand)]
pub enum OverlayCommand {
    /// List overlays
    #[command(alias = "ls")]
    List,

    /// Show one overlay
    Get { name: String },

    /// Create an overlay and provision its CA
    Create {
        name: String,

        #[arg(long, short = 'd')]
        description: Option<String>,
    },

    /// Change an overlay's description
    Update {
        name: String,

        #[arg(long, short = 'd')]
        description: Option<String>,
    },

    /// Delete an empty overlay
    #[command(alias = "rm")]
    Delete { name: String },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  PROPOSALS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ProposalArgs {
    #[command(subcommand)]
    pub command: ProposalCommand,
}

#[derive(Debug, Args)]
pub struct ProposalSpecArgs {
    /// Encryption algorithm (e.g. aes256)
    #[arg(long, required = true)]
    pub encryption: String,

    /// Integrity algorithm (e.g. sha256)
    #[arg(long, required = true)]
    pub hash: String,

    /// Diffie-Hellman group (e.g. modp4096)
    #[arg(long, required = true)]
    pub dh_group: String,

    #[arg(long, short = 'd')]
    pub description: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum ProposalCommand {
    /// List proposals
    #[command(alias = "ls")]
    List,

    /// Show one proposal
    Get { name: String },

    /// Create a proposal
    Create {
        name: String,

        #[command(flatten)]
        spec: ProposalSpecArgs,
    },

    /// Replace a proposal's algorithms
    Update {
        name: String,

        #[command(flatten)]
        spec: ProposalSpecArgs,
    },

    /// Delete a proposal
    #[command(alias = "rm")]
    Delete { name: String },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  IP RANGES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct IpRangeArgs {
    #[command(subcommand)]
    pub command: IpRangeCommand,
}

#[derive(Debug, Args)]
pub struct IpRangeSpecArgs {
    /// Base subnet; the first three octets are used (e.g. 10.10.0.0)
    #[arg(long, required = true)]
    pub subnet: String,

    /// Lowest last octet handed out
    #[arg(long, required = true)]
    pub min: u8,

    /// Highest last octet handed out
    #[arg(long, required = true)]
    pub max: u8,

    #[arg(long, short = 'd')]
    pub description: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum IpRangeCommand {
    /// List ranges with their usage
    #[command(alias = "ls")]
    List,

    /// Show one range and its allocations
    Get { name: String },

    /// Create a range
    Create {
        name: String,

        #[command(flatten)]
        spec: IpRangeSpecArgs,
    },

    /// Resize or move an unused range
    Update {
        name: String,

        #[command(flatten)]
        spec: IpRangeSpecArgs,
    },

    /// Delete an unused range
    #[command(alias = "rm")]
    Delete { name: String },

    /// Allocate the lowest free address
    Allocate {
        /// Entity recorded as the owner of the address
        #[arg(long, required = true)]
        owner: String,
    },

    /// Release one address
    Free { ip: String },

    /// Release every address in every range
    FreeAll,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  HUBS & DEVICES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How a new hub or device is reached.
#[derive(Debug, Args)]
pub struct EdgeArgs {
    /// Public IP to probe; repeat for several
    #[arg(long = "public-ip", value_name = "IP")]
    pub public_ips: Vec<String>,

    /// Kubeconfig file of the edge cluster
    #[arg(long, value_name = "FILE", conflicts_with = "gitops_type")]
    pub kubeconfig: Option<PathBuf>,

    /// GitOps provider type
    #[arg(long, requires_all = ["gitops_reference", "gitops_resource"])]
    pub gitops_type: Option<String>,

    /// GitOps reference object
    #[arg(long)]
    pub gitops_reference: Option<String>,

    /// GitOps resource object
    #[arg(long)]
    pub gitops_resource: Option<String>,

    #[arg(long, short = 'd')]
    pub description: Option<String>,

    /// Wait until registration succeeds or fails
    #[arg(long)]
    pub wait: bool,

    /// Give up waiting after this many seconds
    #[arg(long, default_value = "300", requires = "wait")]
    pub wait_timeout: u64,
}

#[derive(Debug, Args)]
pub struct HubArgs {
    #[command(subcommand)]
    pub command: HubCommand,
}

#[derive(Debug, Subcommand)]
pub enum HubCommand {
    /// List hubs
    #[command(alias = "ls")]
    List,

    /// Show one hub
    Get { name: String },

    /// Register a hub
    Create {
        name: String,

        #[command(flatten)]
        edge: EdgeArgs,

        /// Read the hub document from a JSON file instead of flags
        #[arg(long, short = 'F', conflicts_with_all = ["public_ips", "kubeconfig", "gitops_type"])]
        from_file: Option<PathBuf>,
    },

    /// Change a hub's description
    Update {
        name: String,

        #[arg(long, short = 'd')]
        description: Option<String>,
    },

    /// Tear down a hub's tunnels and unregister it
    #[command(alias = "rm")]
    Delete { name: String },
}

#[derive(Debug, Args)]
pub struct DeviceArgs {
    #[command(subcommand)]
    pub command: DeviceCommand,
}

#[derive(Debug, Subcommand)]
pub enum DeviceCommand {
    /// List devices
    #[command(alias = "ls")]
    List,

    /// Show one device
    Get { name: String },

    /// Register a device
    Create {
        name: String,

        #[command(flatten)]
        edge: EdgeArgs,

        /// Never form direct device-to-device tunnels
        #[arg(long)]
        force_hub_connectivity: bool,

        /// Hub to link to once registered
        #[arg(long)]
        proxy_hub: Option<String>,

        /// Preferred proxy port on the hub
        #[arg(long, requires = "proxy_hub")]
        proxy_hub_port: Option<u16>,

        /// Read the device document from a JSON file instead of flags
        #[arg(long, short = 'F', conflicts_with_all = ["public_ips", "kubeconfig", "gitops_type"])]
        from_file: Option<PathBuf>,
    },

    /// Change a device's description
    Update {
        name: String,

        #[arg(long, short = 'd')]
        description: Option<String>,
    },

    /// Tear down a device's tunnels and unregister it
    #[command(alias = "rm")]
    Delete { name: String },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  HUB-DEVICE LINKS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct HubDeviceArgs {
    #[command(subcommand)]
    pub command: HubDeviceCommand,
}

#[derive(Debug, Subcommand)]
pub enum HubDeviceCommand {
    /// List the devices linked to a hub
    #[command(alias = "ls")]
    List { hub: String },

    /// Link a device to a hub
    Connect { hub: String, device: String },

    /// Remove a hub-device link
    Disconnect { hub: String, device: String },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONNECTIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConnectionArgs {
    #[command(subcommand)]
    pub command: ConnectionCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConnectionCommand {
    /// List connections
    #[command(alias = "ls")]
    List {
        /// Only connections with this end (e.g. Hub.h1)
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Show one connection; ends may be given in either order
    Get { end1: String, end2: String },

    /// Deploy a connection's resources again, e.g. after an install failure
    Redeploy { end1: String, end2: String },

    /// Undeploy and forget a connection
    Disconnect { end1: String, end2: String },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CERTIFICATES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CertType {
    Overlay,
    Hub,
    Device,
}

#[derive(Debug, Args)]
pub struct CertArgs {
    #[command(subcommand)]
    pub command: CertCommand,
}

#[derive(Debug, Subcommand)]
pub enum CertCommand {
    /// List certificates (without key material)
    #[command(alias = "ls")]
    List,

    /// Show one certificate with its PEM data
    Get { name: String },

    /// Issue a certificate under the overlay CA
    Create {
        name: String,

        #[arg(long, default_value = "device")]
        cluster_type: CertType,

        /// Issue a CA certificate
        #[arg(long)]
        ca: bool,

        #[arg(long, short = 'd')]
        description: Option<String>,
    },

    /// Delete a certificate
    #[command(alias = "rm")]
    Delete { name: String },

    /// Print the root certificate followed by the selected ones
    Chain {
        /// Include the certificate of this hub
        #[arg(long)]
        hub: Option<String>,

        /// Include the certificate of this device
        #[arg(long)]
        device: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TokenService {
    Sync,
    Issuer,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the resolved configuration
    Show,

    /// Print the config file path
    Path,

    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Store a collaborator token in the system keyring
    SetToken { service: TokenService },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
