//! Binary entry point for the `rpctl` CLI.

mod cli;

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::process::{self, Command as Process};
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rpctl::{
    Action, ApiError, BatchOptions, BatchOutcome, BatchResult, CancelSignal, ClientContext,
    CloudFilter, ConfigError, Dispatched, ErrorKind, GpuQuery, GpuSort, LiveOrchestrator,
    OperationKind, OperationRequest, ParameterAdapter, Parameters, ResourceKind, RpctlConfig,
    SshOptions, capacity, ssh::SSH_PROGRAM, wait_spec,
};

use cli::{
    BulkArgs, CapacityCommand, CheckArgs, Cli, CloudArg, Command, CompareArgs, CreateArgs,
    EndpointCommand, GpuListArgs, JobArgs, PodCommand, RunArgs, SortArg, SshCommand,
    StorageCommand, UpdateArgs, WaitArgs,
};

/// Exit status for usage errors, matching clap's own.
const EXIT_USAGE: i32 = 2;
const EXIT_CONFIG: i32 = 3;
const EXIT_NOT_FOUND: i32 = 4;
const EXIT_UNAUTHORIZED: i32 = 5;
/// Exit status for timeouts and cancellation, matching `timeout(1)`.
const EXIT_TIMEOUT: i32 = 124;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("{0}")]
    Usage(String),
    #[error("failed to render output: {0}")]
    Render(#[from] serde_json::Error),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
    #[error("failed to run ssh: {0}")]
    Spawn(io::Error),
}

impl CliError {
    const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => EXIT_CONFIG,
            Self::Usage(_) => EXIT_USAGE,
            Self::Render(_) | Self::Output(_) | Self::Spawn(_) => 1,
            Self::Api(err) => match err.kind() {
                ErrorKind::NotFound => EXIT_NOT_FOUND,
                ErrorKind::Unauthorized => EXIT_UNAUTHORIZED,
                ErrorKind::Timeout | ErrorKind::Cancelled => EXIT_TIMEOUT,
                ErrorKind::Transient | ErrorKind::Permanent => 1,
            },
        }
    }
}

/// What a parsed command asks for, before any configuration is loaded.
#[derive(Debug)]
enum Plan {
    Execute(OperationRequest),
    DryRun(OperationRequest),
    List {
        kind: ResourceKind,
        status: Option<String>,
    },
    CreateAndWait {
        request: OperationRequest,
        timeout: Option<u64>,
    },
    Wait {
        kind: ResourceKind,
        args: WaitArgs,
    },
    StopAll(BulkArgs),
    DeleteAll {
        kind: ResourceKind,
        bulk: BulkArgs,
    },
    Gpus(GpuQuery),
    Regions(Option<String>),
    Compare {
        gpus: Vec<String>,
        cloud: CloudFilter,
    },
    Ssh {
        id: String,
        options: SshOptions,
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            err.exit_code()
        }
    };

    process::exit(exit_code);
}

fn init_logging(verbosity: u8) {
    let level = if verbosity > 0 { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rpctl={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    let Cli {
        deadline, command, ..
    } = cli;
    let plan = plan(command)?;
    let config = RpctlConfig::load_without_cli_args()?;

    if let Plan::DryRun(request) = &plan {
        config.validate_settings()?;
        let params = ParameterAdapter::new(config.default_cloud_type.as_str()).adapt_request(request)?;
        emit(&params)?;
        return Ok(0);
    }

    let context = config.into_context()?;
    info!(profile = context.profile(), "using configuration profile");
    let cancel = CancelSignal::new();
    watch_for_cancellation(&cancel, deadline);
    let orchestrator = rpctl::connect(&context, cancel)?;
    run(plan, &orchestrator, &context).await
}

fn plan(command: Command) -> Result<Plan, CliError> {
    match command {
        Command::Pod(pod) => plan_pod(pod),
        Command::Endpoint(endpoint) => plan_endpoint(endpoint),
        Command::Volume(storage) => plan_storage(ResourceKind::Volume, storage),
        Command::Template(storage) => plan_storage(ResourceKind::Template, storage),
        Command::Capacity(query) => plan_capacity(query),
        Command::Ssh(SshCommand::Connect(args)) => Ok(Plan::Ssh {
            id: args.id,
            options: SshOptions {
                user: args.user,
                identity: args.key,
                remote_command: args.command,
            },
            dry_run: args.dry_run,
        }),
    }
}

fn target(kind: ResourceKind, operation: OperationKind, id: String) -> Plan {
    Plan::Execute(OperationRequest::new(kind, operation).with_target(id))
}

fn plan_pod(command: PodCommand) -> Result<Plan, CliError> {
    let kind = ResourceKind::Pod;
    Ok(match command {
        PodCommand::Create(args) => plan_create(kind, args)?,
        PodCommand::Get(args) => target(kind, OperationKind::Get, args.id),
        PodCommand::List(args) => Plan::List {
            kind,
            status: args.status,
        },
        PodCommand::Update(args) => plan_update(kind, args)?,
        PodCommand::Delete(args) => target(kind, OperationKind::Delete, args.id),
        PodCommand::Stop(args) => target(kind, OperationKind::Action(Action::Stop), args.id),
        PodCommand::Start(args) => target(kind, OperationKind::Action(Action::Start), args.id),
        PodCommand::Restart(args) => target(kind, OperationKind::Action(Action::Restart), args.id),
        PodCommand::Wait(args) => Plan::Wait { kind, args },
        PodCommand::StopAll(bulk) => {
            require_confirmation(bulk.confirm, "stop every running pod")?;
            Plan::StopAll(bulk)
        }
        PodCommand::DeleteAll(bulk) => {
            require_confirmation(bulk.confirm, "delete every pod")?;
            Plan::DeleteAll { kind, bulk }
        }
    })
}

fn plan_endpoint(command: EndpointCommand) -> Result<Plan, CliError> {
    let kind = ResourceKind::Endpoint;
    Ok(match command {
        EndpointCommand::Create(args) => plan_create(kind, args)?,
        EndpointCommand::Get(args) => target(kind, OperationKind::Get, args.id),
        EndpointCommand::List(args) => Plan::List {
            kind,
            status: args.status,
        },
        EndpointCommand::Update(args) => plan_update(kind, args)?,
        EndpointCommand::Delete(args) => target(kind, OperationKind::Delete, args.id),
        EndpointCommand::Health(args) => {
            target(kind, OperationKind::Action(Action::Health), args.id)
        }
        EndpointCommand::Run(args) => plan_run(Action::Run, args)?,
        EndpointCommand::RunSync(args) => plan_run(Action::RunSync, args)?,
        EndpointCommand::JobStatus(args) => plan_job(Action::JobStatus, args),
        EndpointCommand::JobCancel(args) => plan_job(Action::JobCancel, args),
        EndpointCommand::PurgeQueue(args) => {
            require_confirmation(args.confirm, "purge every queued job")?;
            target(kind, OperationKind::Action(Action::PurgeQueue), args.id)
        }
        EndpointCommand::Wait(args) => Plan::Wait { kind, args },
        EndpointCommand::DeleteAll(bulk) => {
            require_confirmation(bulk.confirm, "delete every endpoint")?;
            Plan::DeleteAll { kind, bulk }
        }
    })
}

fn plan_storage(kind: ResourceKind, command: StorageCommand) -> Result<Plan, CliError> {
    Ok(match command {
        StorageCommand::Create(args) => plan_create(kind, args)?,
        StorageCommand::Get(args) => target(kind, OperationKind::Get, args.id),
        StorageCommand::List(args) => Plan::List {
            kind,
            status: args.status,
        },
        StorageCommand::Update(args) => plan_update(kind, args)?,
        StorageCommand::Delete(args) => target(kind, OperationKind::Delete, args.id),
        StorageCommand::DeleteAll(bulk) => {
            require_confirmation(bulk.confirm, &format!("delete every {kind}"))?;
            Plan::DeleteAll { kind, bulk }
        }
    })
}

fn plan_capacity(command: CapacityCommand) -> Result<Plan, CliError> {
    let kind = ResourceKind::Gpu;
    Ok(match command {
        CapacityCommand::Gpus(args) => Plan::Gpus(gpu_query(&args)),
        CapacityCommand::Gpu(args) => target(kind, OperationKind::Get, args.id),
        CapacityCommand::Check(args) => plan_check(args),
        CapacityCommand::Regions(args) => Plan::Regions(args.gpu),
        CapacityCommand::Cpus => Plan::List {
            kind: ResourceKind::Cpu,
            status: None,
        },
        CapacityCommand::Compare(args) => plan_compare(args)?,
    })
}

const fn cloud_filter(cloud: CloudArg) -> CloudFilter {
    match cloud {
        CloudArg::All => CloudFilter::All,
        CloudArg::Secure => CloudFilter::Secure,
        CloudArg::Community => CloudFilter::Community,
    }
}

const fn gpu_query(args: &GpuListArgs) -> GpuQuery {
    GpuQuery {
        cloud: cloud_filter(args.cloud),
        min_vram_gb: args.min_vram,
        available_only: args.available_only,
        sort: match args.sort {
            SortArg::Price => GpuSort::Price,
            SortArg::Vram => GpuSort::Vram,
            SortArg::Name => GpuSort::Name,
            SortArg::Availability => GpuSort::Availability,
        },
    }
}

fn plan_compare(args: CompareArgs) -> Result<Plan, CliError> {
    capacity::check_comparison(&args.gpus)?;
    Ok(Plan::Compare {
        gpus: args.gpus,
        cloud: cloud_filter(args.cloud),
    })
}


fn plan_create(kind: ResourceKind, args: CreateArgs) -> Result<Plan, CliError> {
    let request = OperationRequest::new(kind, OperationKind::Create)
        .with_params(collect_params(args.params, args.env)?);
    if args.dry_run {
        return Ok(Plan::DryRun(request));
    }
    if !args.wait {
        return Ok(Plan::Execute(request));
    }
    if !matches!(kind, ResourceKind::Pod | ResourceKind::Endpoint) {
        return Err(CliError::Usage(format!("--wait is not supported for {kind}")));
    }
    Ok(Plan::CreateAndWait {
        request,
        timeout: args.timeout,
    })
}

fn plan_update(kind: ResourceKind, args: UpdateArgs) -> Result<Plan, CliError> {
    let request = OperationRequest::new(kind, OperationKind::Update)
        .with_target(args.id)
        .with_params(collect_params(args.params, args.env)?);
    Ok(if args.dry_run {
        Plan::DryRun(request)
    } else {
        Plan::Execute(request)
    })
}

fn plan_run(action: Action, args: RunArgs) -> Result<Plan, CliError> {
    let input: Value = serde_json::from_str(&args.input)
        .map_err(|err| CliError::Usage(format!("--input is not valid JSON: {err}")))?;
    Ok(Plan::Execute(
        OperationRequest::new(ResourceKind::Endpoint, OperationKind::Action(action))
            .with_target(args.id)
            .with_param("input", input),
    ))
}

fn plan_job(action: Action, args: JobArgs) -> Plan {
    Plan::Execute(
        OperationRequest::new(ResourceKind::Endpoint, OperationKind::Action(action))
            .with_target(args.id)
            .with_param("job_id", args.job_id),
    )
}

fn plan_check(args: CheckArgs) -> Plan {
    let mut request = OperationRequest::new(ResourceKind::Gpu, OperationKind::Action(Action::Check))
        .with_target(args.id);
    if let Some(count) = args.count {
        request = request.with_param("gpu_count", count);
    }
    if args.secure {
        request = request.with_param("secure_cloud", true);
    }
    Plan::Execute(request)
}

fn require_confirmation(confirmed: bool, action: &str) -> Result<(), CliError> {
    if confirmed {
        Ok(())
    } else {
        Err(CliError::Usage(format!(
            "refusing to {action} without --confirm"
        )))
    }
}

fn collect_params(pairs: Vec<(String, String)>, env: Vec<String>) -> Result<Parameters, CliError> {
    let mut params = BTreeMap::new();
    for (key, value) in pairs {
        if params.contains_key(&key) {
            return Err(CliError::Usage(format!("parameter '{key}' given more than once")));
        }
        params.insert(key, Value::String(value));
    }
    if !env.is_empty() {
        if params.contains_key("env") {
            return Err(CliError::Usage(String::from(
                "use either --env or -p env=..., not both",
            )));
        }
        params.insert(
            String::from("env"),
            Value::Array(env.into_iter().map(Value::String).collect()),
        );
    }
    Ok(params)
}

async fn run(
    plan: Plan,
    orchestrator: &LiveOrchestrator,
    context: &ClientContext,
) -> Result<i32, CliError> {
    match plan {
        Plan::Execute(request) => {
            emit(&orchestrator.execute(&request).await?)?;
            Ok(0)
        }
        Plan::DryRun(request) => {
            emit(&orchestrator.prepare(&request)?)?;
            Ok(0)
        }
        Plan::List { kind, status } => {
            let mut resources = orchestrator.list(kind).await?;
            if let Some(wanted) = status {
                resources.retain(|resource| resource.status.eq_ignore_ascii_case(&wanted));
            }
            emit(&resources)?;
            Ok(0)
        }
        Plan::CreateAndWait { request, timeout } => {
            let spec = wait_spec(
                request.target_kind,
                context.poll_interval(),
                timeout.map_or(context.poll_timeout(), Duration::from_secs),
            )?;
            emit(&orchestrator.create_and_wait(&request, &spec).await?)?;
            Ok(0)
        }
        Plan::Wait { kind, args } => {
            let spec = wait_spec(
                kind,
                args.interval.map_or(context.poll_interval(), Duration::from_secs),
                args.timeout.map_or(context.poll_timeout(), Duration::from_secs),
            )?;
            emit(&orchestrator.wait(kind, &args.id, &spec).await?)?;
            Ok(0)
        }
        Plan::StopAll(bulk) => {
            let result = orchestrator.stop_all(batch_options(&bulk, context)).await?;
            emit_batch(&result)
        }
        Plan::DeleteAll { kind, bulk } => {
            let result = orchestrator
                .delete_all(kind, batch_options(&bulk, context))
                .await?;
            emit_batch(&result)
        }
        Plan::Gpus(query) => {
            emit(&orchestrator.gpu_types(&query).await?)?;
            Ok(0)
        }
        Plan::Regions(gpu) => {
            emit(&orchestrator.regions(gpu.as_deref()).await?)?;
            Ok(0)
        }
        Plan::Compare { gpus, cloud } => {
            emit(&orchestrator.compare_gpus(&gpus, cloud).await?)?;
            Ok(0)
        }
        Plan::Ssh {
            id,
            options,
            dry_run,
        } => {
            let endpoint = orchestrator.ssh_endpoint(&id).await?;
            let args = options.args(&endpoint);
            if dry_run {
                let rendered: Vec<String> = args
                    .iter()
                    .map(|arg| arg.to_string_lossy().into_owned())
                    .collect();
                emit(&json!({"program": SSH_PROGRAM, "args": rendered, "endpoint": endpoint}))?;
                return Ok(0);
            }
            info!(pod = %id, host = %endpoint.host, port = endpoint.port, "opening ssh session");
            let status = Process::new(SSH_PROGRAM)
                .args(&args)
                .status()
                .map_err(CliError::Spawn)?;
            Ok(status.code().unwrap_or(1))
        }
    }
}

fn batch_options(bulk: &BulkArgs, context: &ClientContext) -> BatchOptions {
    BatchOptions {
        parallel: bulk.parallel,
        workers: bulk
            .workers
            .map_or(context.batch_workers(), usize::from),
    }
}

fn watch_for_cancellation(cancel: &CancelSignal, deadline: Option<u64>) {
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; cancelling");
            on_interrupt.cancel();
        }
    });
    if let Some(secs) = deadline {
        let on_deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!(secs, "deadline reached; cancelling");
            on_deadline.cancel();
        });
    }
}

fn batch_report(result: &BatchResult<Dispatched>) -> Value {
    let items: Vec<Value> = result
        .iter()
        .map(|(id, outcome)| match outcome {
            BatchOutcome::Succeeded(dispatched) => {
                json!({"id": id, "outcome": outcome.label(), "result": dispatched})
            }
            BatchOutcome::Failed(error) => json!({
                "id": id,
                "outcome": outcome.label(),
                "kind": error.kind().as_str(),
                "error": error.to_string(),
            }),
            BatchOutcome::Cancelled => json!({"id": id, "outcome": outcome.label()}),
        })
        .collect();
    json!({
        "succeeded": result.succeeded_count,
        "failed": result.failed_count,
        "cancelled": result.cancelled_count,
        "items": items,
    })
}

const fn batch_exit_code(failed: usize, cancelled: usize) -> i32 {
    if failed > 0 {
        1
    } else if cancelled > 0 {
        EXIT_TIMEOUT
    } else {
        0
    }
}

fn emit_batch(result: &BatchResult<Dispatched>) -> Result<i32, CliError> {
    emit(&batch_report(result))?;
    Ok(batch_exit_code(result.failed_count, result.cancelled_count))
}

fn emit(value: &impl Serialize) -> Result<(), CliError> {
    write_json(io::stdout(), value)
}

fn write_json(mut target: impl Write, value: &impl Serialize) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    writeln!(target, "{rendered}")?;
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "error: {err}").ok();
}
