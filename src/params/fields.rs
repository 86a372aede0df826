//! Per-kind parameter tables.
//!
//! Each entry names a parameter as the CLI spells it, the key the typed SDK
//! surface expects (absent when the SDK has no equivalent), and the key the
//! query channel expects.

use crate::resource::{Action, OperationKind, ResourceKind};

/// Value shape a parameter is coerced to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Shape {
    /// Free text.
    Text,
    /// Text; a list is joined with commas.
    CommaText,
    /// Whole number.
    Integer,
    /// Floating point number.
    Number,
    /// `true` or `false`.
    Flag,
    /// List of text; a comma-separated string is split.
    List,
    /// `KEY=VALUE` pairs collected into an object.
    EnvMap,
    /// Arbitrary JSON object.
    Object,
}

/// Value substituted when the caller leaves a parameter unset on create.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Fallback {
    /// No default; the field is omitted.
    Unset,
    /// Fixed text.
    Text(&'static str),
    /// Fixed whole number.
    Integer(i64),
    /// Fixed flag.
    Flag(bool),
    /// `<prefix>-<8 hex chars>`.
    GeneratedName(&'static str),
    /// The profile's default cloud type.
    CloudType,
}

/// One accepted parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct FieldSpec {
    pub(crate) name: &'static str,
    pub(crate) alias: Option<&'static str>,
    pub(crate) sdk_key: Option<&'static str>,
    pub(crate) generic_key: &'static str,
    pub(crate) shape: Shape,
    pub(crate) fallback: Fallback,
    pub(crate) required: bool,
    pub(crate) updatable: bool,
}

const fn field(name: &'static str, generic_key: &'static str, shape: Shape) -> FieldSpec {
    FieldSpec {
        name,
        alias: None,
        sdk_key: Some(name),
        generic_key,
        shape,
        fallback: Fallback::Unset,
        required: false,
        updatable: true,
    }
}

impl FieldSpec {
    const fn alias(mut self, alias: &'static str) -> Self {
        self.alias = Some(alias);
        self
    }

    const fn generic_only(mut self) -> Self {
        self.sdk_key = None;
        self
    }

    const fn default_to(mut self, fallback: Fallback) -> Self {
        self.fallback = fallback;
        self
    }

    const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    const fn fixed(mut self) -> Self {
        self.updatable = false;
        self
    }
}

const POD_FIELDS: &[FieldSpec] = &[
    field("name", "name", Shape::Text).default_to(Fallback::GeneratedName("rpctl-pod")),
    field("image_name", "imageName", Shape::Text).alias("image"),
    field("template_id", "templateId", Shape::Text).fixed(),
    field("gpu_type_ids", "gpuTypeIds", Shape::List)
        .alias("gpu")
        .fixed(),
    field("gpu_count", "gpuCount", Shape::Integer)
        .default_to(Fallback::Integer(1))
        .fixed(),
    field("cloud_type", "cloudType", Shape::Text)
        .default_to(Fallback::CloudType)
        .fixed(),
    field("container_disk_in_gb", "containerDiskInGb", Shape::Integer)
        .default_to(Fallback::Integer(50)),
    field("volume_in_gb", "volumeInGb", Shape::Integer).default_to(Fallback::Integer(20)),
    field("volume_mount_path", "volumeMountPath", Shape::Text)
        .default_to(Fallback::Text("/workspace")),
    field("network_volume_id", "networkVolumeId", Shape::Text).fixed(),
    field("ports", "ports", Shape::CommaText).default_to(Fallback::Text("8888/http,22/tcp")),
    field("env", "env", Shape::EnvMap),
    field("docker_args", "dockerArgs", Shape::Text),
    field("data_center_ids", "dataCenterIds", Shape::List)
        .alias("region")
        .fixed(),
    field("min_vcpu_count", "minVcpuCount", Shape::Integer)
        .default_to(Fallback::Integer(2))
        .fixed(),
    field("min_memory_in_gb", "minMemoryInGb", Shape::Integer)
        .default_to(Fallback::Integer(8))
        .fixed(),
    field("bid_per_gpu", "bidPerGpu", Shape::Number).fixed(),
    field("allowed_cuda_versions", "allowedCudaVersions", Shape::List)
        .alias("cuda_versions")
        .fixed(),
    field("support_public_ip", "supportPublicIp", Shape::Flag).fixed(),
    field("country_code", "countryCode", Shape::Text)
        .generic_only()
        .fixed(),
    field("min_download", "minDownload", Shape::Integer)
        .generic_only()
        .fixed(),
    field("min_upload", "minUpload", Shape::Integer)
        .generic_only()
        .fixed(),
];

const ENDPOINT_FIELDS: &[FieldSpec] = &[
    field("name", "name", Shape::Text).required(),
    field("template_id", "templateId", Shape::Text).required(),
    field("gpu_ids", "gpuIds", Shape::CommaText)
        .alias("gpu")
        .default_to(Fallback::Text("AMPERE_24")),
    field("gpu_count", "gpuCount", Shape::Integer),
    field("workers_min", "workersMin", Shape::Integer).default_to(Fallback::Integer(0)),
    field("workers_max", "workersMax", Shape::Integer).default_to(Fallback::Integer(3)),
    field("idle_timeout", "idleTimeout", Shape::Integer).default_to(Fallback::Integer(5)),
    field("scaler_type", "scalerType", Shape::Text).default_to(Fallback::Text("QUEUE_DELAY")),
    field("scaler_value", "scalerValue", Shape::Integer).default_to(Fallback::Integer(4)),
    field("network_volume_id", "networkVolumeId", Shape::Text),
    field("data_center_ids", "locations", Shape::List).alias("region"),
    field("flashboot", "flashboot", Shape::Flag),
    field("allowed_cuda_versions", "allowedCudaVersions", Shape::CommaText)
        .alias("cuda_versions"),
    field("execution_timeout_ms", "executionTimeoutMs", Shape::Integer).generic_only(),
];

const VOLUME_FIELDS: &[FieldSpec] = &[
    field("name", "name", Shape::Text).required(),
    field("size", "size", Shape::Integer).default_to(Fallback::Integer(20)),
    field("data_center_id", "dataCenterId", Shape::Text)
        .alias("region")
        .required()
        .fixed(),
];

const TEMPLATE_FIELDS: &[FieldSpec] = &[
    field("name", "name", Shape::Text).required(),
    field("image_name", "imageName", Shape::Text)
        .alias("image")
        .required(),
    field("container_disk_in_gb", "containerDiskInGb", Shape::Integer)
        .default_to(Fallback::Integer(50)),
    field("volume_in_gb", "volumeInGb", Shape::Integer).default_to(Fallback::Integer(20)),
    field("volume_mount_path", "volumeMountPath", Shape::Text)
        .default_to(Fallback::Text("/workspace")),
    field("ports", "ports", Shape::CommaText),
    field("env", "env", Shape::EnvMap),
    field("docker_args", "dockerArgs", Shape::Text),
    field("is_serverless", "isServerless", Shape::Flag)
        .default_to(Fallback::Flag(false))
        .fixed(),
    field("container_registry_auth_id", "containerRegistryAuthId", Shape::Text),
    field("readme", "readme", Shape::Text).generic_only(),
];

const RUN_FIELDS: &[FieldSpec] = &[field("input", "input", Shape::Object).required()];

const JOB_FIELDS: &[FieldSpec] = &[field("job_id", "jobId", Shape::Text)
    .alias("job")
    .required()];

const GPU_CHECK_FIELDS: &[FieldSpec] = &[
    field("gpu_count", "gpuCount", Shape::Integer).default_to(Fallback::Integer(1)),
    field("secure_cloud", "secureCloud", Shape::Flag),
];

/// Returns the parameters accepted by `(kind, operation)`.
pub(crate) const fn fields_for(kind: ResourceKind, operation: OperationKind) -> &'static [FieldSpec] {
    match (kind, operation) {
        (ResourceKind::Pod, OperationKind::Create | OperationKind::Update) => POD_FIELDS,
        (ResourceKind::Endpoint, OperationKind::Create | OperationKind::Update) => ENDPOINT_FIELDS,
        (ResourceKind::Volume, OperationKind::Create | OperationKind::Update) => VOLUME_FIELDS,
        (ResourceKind::Template, OperationKind::Create | OperationKind::Update) => TEMPLATE_FIELDS,
        (ResourceKind::Endpoint, OperationKind::Action(Action::Run | Action::RunSync)) => RUN_FIELDS,
        (ResourceKind::Endpoint, OperationKind::Action(Action::JobStatus | Action::JobCancel)) => {
            JOB_FIELDS
        }
        (ResourceKind::Gpu, OperationKind::Action(Action::Check)) => GPU_CHECK_FIELDS,
        _ => &[],
    }
}

/// Reports whether `(kind, operation)` accepts the `spot` shorthand.
pub(crate) const fn accepts_spot(kind: ResourceKind, operation: OperationKind) -> bool {
    matches!(
        (kind, operation),
        (ResourceKind::Pod, OperationKind::Create)
    )
}
