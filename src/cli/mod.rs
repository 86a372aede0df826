//! Command-line interface definitions for the `rpctl` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Top-level CLI for the `rpctl` binary.
#[derive(Debug, Parser)]
#[command(
    name = "rpctl",
    version,
    about = "Manage RunPod pods, serverless endpoints, volumes, and templates",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Log progress to stderr; repeat for more detail.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,
    /// Cancel the whole command after this many seconds.
    #[arg(long, global = true, value_name = "SECS")]
    pub(crate) deadline: Option<u64>,
    /// Resource family to act on.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Resource families.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Manage GPU pods.
    #[command(subcommand)]
    Pod(PodCommand),
    /// Manage serverless endpoints and their jobs.
    #[command(subcommand)]
    Endpoint(EndpointCommand),
    /// Manage network volumes.
    #[command(subcommand)]
    Volume(StorageCommand),
    /// Manage templates.
    #[command(subcommand)]
    Template(StorageCommand),
    /// Inspect GPU types, prices, and stock.
    #[command(subcommand)]
    Capacity(CapacityCommand),
    /// Connect to running pods.
    #[command(subcommand)]
    Ssh(SshCommand),
}

/// Pod operations.
#[derive(Debug, Subcommand)]
pub(crate) enum PodCommand {
    /// Create a pod.
    Create(CreateArgs),
    /// Show one pod.
    Get(IdArgs),
    /// List pods.
    List(ListArgs),
    /// Change a pod's settings.
    Update(UpdateArgs),
    /// Terminate a pod.
    Delete(IdArgs),
    /// Stop a running pod.
    Stop(IdArgs),
    /// Resume a stopped pod.
    Start(IdArgs),
    /// Restart a pod.
    Restart(IdArgs),
    /// Wait until a pod is running with its ports exposed.
    Wait(WaitArgs),
    /// Stop every running pod.
    StopAll(BulkArgs),
    /// Terminate every pod.
    DeleteAll(BulkArgs),
}

/// Endpoint operations.
#[derive(Debug, Subcommand)]
pub(crate) enum EndpointCommand {
    /// Create an endpoint.
    Create(CreateArgs),
    /// Show one endpoint.
    Get(IdArgs),
    /// List endpoints.
    List(ListArgs),
    /// Change an endpoint's settings.
    Update(UpdateArgs),
    /// Delete an endpoint.
    Delete(IdArgs),
    /// Show worker and queue health.
    Health(IdArgs),
    /// Submit a job without waiting for its output.
    Run(RunArgs),
    /// Submit a job and wait for its output.
    RunSync(RunArgs),
    /// Show the status of a submitted job.
    JobStatus(JobArgs),
    /// Cancel a submitted job.
    JobCancel(JobArgs),
    /// Drop every queued job.
    PurgeQueue(ConfirmedIdArgs),
    /// Wait until at least one worker is ready.
    Wait(WaitArgs),
    /// Delete every endpoint.
    DeleteAll(BulkArgs),
}

/// Operations shared by volumes and templates.
#[derive(Debug, Subcommand)]
pub(crate) enum StorageCommand {
    /// Create one.
    Create(CreateArgs),
    /// Show one.
    Get(IdArgs),
    /// List all.
    List(ListArgs),
    /// Change settings.
    Update(UpdateArgs),
    /// Delete one.
    Delete(IdArgs),
    /// Delete all.
    DeleteAll(BulkArgs),
}

/// Capacity queries.
#[derive(Debug, Subcommand)]
pub(crate) enum CapacityCommand {
    /// List GPU types with prices.
    Gpus(GpuListArgs),
    /// Show one GPU type.
    Gpu(IdArgs),
    /// Show stock and pricing for a GPU count and cloud.
    Check(CheckArgs),
    /// List datacenters and the GPU types they stock.
    Regions(RegionArgs),
    /// List CPU types.
    Cpus,
    /// Show several GPU types side by side.
    Compare(CompareArgs),
}

/// SSH operations.
#[derive(Debug, Subcommand)]
pub(crate) enum SshCommand {
    /// Open an SSH session to a running pod.
    Connect(SshArgs),
}

/// A single target.
#[derive(Debug, Args)]
pub(crate) struct IdArgs {
    /// Resource identifier.
    pub(crate) id: String,
}

/// A target for a destructive action that needs confirmation.
#[derive(Debug, Args)]
pub(crate) struct ConfirmedIdArgs {
    /// Resource identifier.
    pub(crate) id: String,
    /// Confirm the action.
    #[arg(long)]
    pub(crate) confirm: bool,
}

/// Creation parameters.
#[derive(Debug, Args)]
pub(crate) struct CreateArgs {
    /// Resource parameter, for example `-p image_name=runpod/base:0.4`.
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE", value_parser = parse_pair)]
    pub(crate) params: Vec<(String, String)>,
    /// Environment variable passed to the container.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub(crate) env: Vec<String>,
    /// Print the adapted parameters instead of sending them.
    #[arg(long)]
    pub(crate) dry_run: bool,
    /// Wait for the new pod or endpoint to become ready.
    #[arg(long, conflicts_with = "dry_run")]
    pub(crate) wait: bool,
    /// Seconds to wait when `--wait` is given.
    #[arg(long, value_name = "SECS", requires = "wait")]
    pub(crate) timeout: Option<u64>,
}

/// Update parameters.
#[derive(Debug, Args)]
pub(crate) struct UpdateArgs {
    /// Resource identifier.
    pub(crate) id: String,
    /// Changed parameter.
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE", value_parser = parse_pair)]
    pub(crate) params: Vec<(String, String)>,
    /// Replacement environment variable.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub(crate) env: Vec<String>,
    /// Print the adapted parameters instead of sending them.
    #[arg(long)]
    pub(crate) dry_run: bool,
}

/// List filters.
#[derive(Debug, Args)]
pub(crate) struct ListArgs {
    /// Only show resources with this status, ignoring case.
    #[arg(long, value_name = "STATUS")]
    pub(crate) status: Option<String>,
}

/// Wait settings.
#[derive(Debug, Args)]
pub(crate) struct WaitArgs {
    /// Resource identifier.
    pub(crate) id: String,
    /// Maximum seconds to wait.
    #[arg(long, value_name = "SECS")]
    pub(crate) timeout: Option<u64>,
    /// Seconds between checks.
    #[arg(long, value_name = "SECS")]
    pub(crate) interval: Option<u64>,
}

/// Settings for commands that act on every resource of a kind.
#[derive(Debug, Args)]
pub(crate) struct BulkArgs {
    /// Confirm the bulk action.
    #[arg(long)]
    pub(crate) confirm: bool,
    /// Act on resources concurrently.
    #[arg(long)]
    pub(crate) parallel: bool,
    /// Concurrent workers when `--parallel` is given.
    #[arg(
        long,
        value_name = "N",
        requires = "parallel",
        value_parser = clap::value_parser!(u16).range(1..=20)
    )]
    pub(crate) workers: Option<u16>,
}

/// Job submission.
#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    /// Endpoint identifier.
    pub(crate) id: String,
    /// Job input as a JSON object.
    #[arg(long, value_name = "JSON")]
    pub(crate) input: String,
}

/// Job control.
#[derive(Debug, Args)]
pub(crate) struct JobArgs {
    /// Endpoint identifier.
    pub(crate) id: String,
    /// Job identifier.
    pub(crate) job_id: String,
}

/// Availability query.
#[derive(Debug, Args)]
pub(crate) struct CheckArgs {
    /// GPU type identifier, for example `NVIDIA GeForce RTX 4090`.
    pub(crate) id: String,
    /// Number of GPUs.
    #[arg(long, value_name = "N")]
    pub(crate) count: Option<u32>,
    /// Restrict to secure cloud.
    #[arg(long)]
    pub(crate) secure: bool,
}

/// Cloud a GPU type must be offered in.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub(crate) enum CloudArg {
    /// Secure or community cloud.
    #[default]
    All,
    /// Secure cloud only.
    Secure,
    /// Community cloud only.
    Community,
}

/// Ordering of a GPU listing.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub(crate) enum SortArg {
    /// Cheapest on-demand price first.
    #[default]
    Price,
    /// Most memory first.
    Vram,
    /// Alphabetical by display name.
    Name,
    /// Largest fleet first.
    Availability,
}

/// GPU listing filters.
#[derive(Debug, Args)]
pub(crate) struct GpuListArgs {
    /// Only types offered in this cloud.
    #[arg(long, value_enum, default_value_t)]
    pub(crate) cloud: CloudArg,
    /// Minimum memory per GPU in GB.
    #[arg(long, value_name = "GB")]
    pub(crate) min_vram: Option<u64>,
    /// Hide types that are out of stock.
    #[arg(long)]
    pub(crate) available_only: bool,
    /// Sort order.
    #[arg(long, value_enum, default_value_t)]
    pub(crate) sort: SortArg,
}

/// Datacenter filters.
#[derive(Debug, Args)]
pub(crate) struct RegionArgs {
    /// Only datacenters stocking a GPU type whose name contains this text.
    #[arg(long, value_name = "GPU")]
    pub(crate) gpu: Option<String>,
}

/// GPU types to compare.
#[derive(Debug, Args)]
pub(crate) struct CompareArgs {
    /// GPU type ids or display names.
    #[arg(value_name = "GPU")]
    pub(crate) gpus: Vec<String>,
    /// Cloud to price in.
    #[arg(long, value_enum, default_value_t)]
    pub(crate) cloud: CloudArg,
}

/// SSH session settings.
#[derive(Debug, Args)]
pub(crate) struct SshArgs {
    /// Pod identifier.
    pub(crate) id: String,
    /// Login user.
    #[arg(short, long, default_value = "root")]
    pub(crate) user: String,
    /// Private key file.
    #[arg(short = 'i', long, value_name = "PATH")]
    pub(crate) key: Option<String>,
    /// Run this command instead of an interactive shell.
    #[arg(short, long, value_name = "CMD")]
    pub(crate) command: Option<String>,
    /// Print the ssh invocation instead of running it.
    #[arg(long)]
    pub(crate) dry_run: bool,
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let name = key.trim();
    if name.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((name.to_owned(), value.to_owned()))
}
