//! Query and mutation documents sent over the generic channel.

use crate::resource::{Action, OperationKind, ResourceKind};

/// How a document's variables are assembled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Variables {
    /// No variables.
    Empty,
    /// `{ <key>: target_id }`.
    Id(&'static str),
    /// `{ input: fields }`.
    Input,
    /// `{ input: fields + { id: target_id } }`.
    InputWithId,
    /// `{ <key>: target_id, ...fields }`.
    Flat(&'static str),
}

/// How the selected payload maps onto the dispatch result.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Extract {
    /// A single resource object.
    One,
    /// The first element of a list; an empty list means not found.
    First,
    /// A list of resources.
    Many,
    /// A list from which the target id is picked client-side.
    FindById,
    /// An acknowledgement payload.
    Receipt,
}

/// A document plus the instructions for building and reading it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Document {
    pub(crate) text: &'static str,
    pub(crate) variables: Variables,
    pub(crate) path: &'static [&'static str],
    pub(crate) extract: Extract,
}

const VOLUME_FIELDS_LIST: &str = r"
query NetworkVolumes {
  myself {
    networkVolumes {
      id
      name
      size
      dataCenterId
    }
  }
}
";

const VOLUME_CREATE: &str = r"
mutation CreateNetworkVolume($input: CreateNetworkVolumeInput!) {
  createNetworkVolume(input: $input) {
    id
    name
    size
    dataCenterId
  }
}
";

const VOLUME_UPDATE: &str = r"
mutation UpdateNetworkVolume($input: UpdateNetworkVolumeInput!) {
  updateNetworkVolume(input: $input) {
    id
    name
    size
    dataCenterId
  }
}
";

const VOLUME_DELETE: &str = r"
mutation DeleteNetworkVolume($id: String!) {
  deleteNetworkVolume(input: {id: $id})
}
";

const TEMPLATE_LIST: &str = r"
query PodTemplates {
  myself {
    podTemplates {
      id
      name
      imageName
      isServerless
      isPublic
      containerDiskInGb
      volumeInGb
      volumeMountPath
      ports
      dockerArgs
      readme
      env {
        key
        value
      }
    }
  }
}
";

const TEMPLATE_SAVE: &str = r"
mutation SaveTemplate($input: SaveTemplateInput!) {
  saveTemplate(input: $input) {
    id
    name
    imageName
    isServerless
    containerDiskInGb
    volumeInGb
    volumeMountPath
    ports
    dockerArgs
    readme
    env {
      key
      value
    }
  }
}
";

const TEMPLATE_DELETE: &str = r"
mutation DeleteTemplate($templateId: String!) {
  deleteTemplate(templateId: $templateId)
}
";

const GPU_TYPES_LIST: &str = r"
query GpuTypes {
  gpuTypes {
    id
    displayName
    manufacturer
    memoryInGb
    cudaCores
    secureCloud
    communityCloud
    securePrice
    communityPrice
    secureSpotPrice
    communitySpotPrice
    maxGpuCount
    maxGpuCountSecureCloud
    maxGpuCountCommunityCloud
    lowestPrice(input: {gpuCount: 1}) {
      minimumBidPrice
      uninterruptablePrice
      stockStatus
      rentedCount
      totalCount
      rentalPercentage
      maxUnreservedGpuCount
      availableGpuCounts
    }
  }
}
";

const GPU_TYPE_GET: &str = r"
query GpuType($gpuTypeId: String!) {
  gpuTypes(input: {id: $gpuTypeId}) {
    id
    displayName
    manufacturer
    memoryInGb
    securePrice
    communityPrice
    secureSpotPrice
    communitySpotPrice
    maxGpuCount
  }
}
";

const GPU_TYPE_AVAILABILITY: &str = r"
query GpuTypeAvailability($gpuTypeId: String!, $gpuCount: Int!, $secureCloud: Boolean) {
  gpuTypes(input: {id: $gpuTypeId}) {
    id
    displayName
    memoryInGb
    securePrice
    communityPrice
    secureSpotPrice
    communitySpotPrice
    lowestPrice(input: {gpuCount: $gpuCount, secureCloud: $secureCloud}) {
      minimumBidPrice
      uninterruptablePrice
      stockStatus
      rentedCount
      totalCount
      rentalPercentage
      maxUnreservedGpuCount
      availableGpuCounts
      countryCode
    }
  }
}
";

const DATACENTER_AVAILABILITY: &str = r"
query DatacenterAvailability {
  myself {
    datacenters {
      id
      name
      location
      region
      listed
      storageSupport
      gpuAvailability(input: {gpuCount: 1}) {
        gpuTypeId
        gpuTypeDisplayName
        available
        stockStatus
      }
    }
  }
}
";

const CPU_TYPES_LIST: &str = r"
query CpuTypes {
  cpuTypes {
    id
    displayName
    manufacturer
    cores
    threadsPerCore
    groupId
  }
}
";

const JOB_STATUS: &str = r"
query JobStatus($endpointId: String!, $jobId: String!) {
  serverlessJob(endpointId: $endpointId, jobId: $jobId) {
    id
    status
    delayTime
    executionTime
    output
    error
  }
}
";

const JOB_CANCEL: &str = r"
mutation CancelJob($endpointId: String!, $jobId: String!) {
  cancelServerlessJob(endpointId: $endpointId, jobId: $jobId) {
    id
    status
  }
}
";

const fn document(
    text: &'static str,
    variables: Variables,
    path: &'static [&'static str],
    extract: Extract,
) -> Document {
    Document {
        text,
        variables,
        path,
        extract,
    }
}

/// Returns the document serving `operation` on `kind` over the generic
/// channel.
pub(crate) const fn document_for(kind: ResourceKind, operation: OperationKind) -> Option<Document> {
    let found = match (kind, operation) {
        (ResourceKind::Volume, OperationKind::List) => document(
            VOLUME_FIELDS_LIST,
            Variables::Empty,
            &["myself", "networkVolumes"],
            Extract::Many,
        ),
        (ResourceKind::Volume, OperationKind::Get) => document(
            VOLUME_FIELDS_LIST,
            Variables::Empty,
            &["myself", "networkVolumes"],
            Extract::FindById,
        ),
        (ResourceKind::Volume, OperationKind::Create) => document(
            VOLUME_CREATE,
            Variables::Input,
            &["createNetworkVolume"],
            Extract::One,
        ),
        (ResourceKind::Volume, OperationKind::Update) => document(
            VOLUME_UPDATE,
            Variables::InputWithId,
            &["updateNetworkVolume"],
            Extract::One,
        ),
        (ResourceKind::Volume, OperationKind::Delete) => document(
            VOLUME_DELETE,
            Variables::Id("id"),
            &["deleteNetworkVolume"],
            Extract::Receipt,
        ),
        (ResourceKind::Template, OperationKind::List) => document(
            TEMPLATE_LIST,
            Variables::Empty,
            &["myself", "podTemplates"],
            Extract::Many,
        ),
        (ResourceKind::Template, OperationKind::Get) => document(
            TEMPLATE_LIST,
            Variables::Empty,
            &["myself", "podTemplates"],
            Extract::FindById,
        ),
        (ResourceKind::Template, OperationKind::Update) => document(
            TEMPLATE_SAVE,
            Variables::InputWithId,
            &["saveTemplate"],
            Extract::One,
        ),
        (ResourceKind::Template, OperationKind::Delete) => document(
            TEMPLATE_DELETE,
            Variables::Id("templateId"),
            &["deleteTemplate"],
            Extract::Receipt,
        ),
        (ResourceKind::Gpu, OperationKind::List) => {
            document(GPU_TYPES_LIST, Variables::Empty, &["gpuTypes"], Extract::Many)
        }
        (ResourceKind::Gpu, OperationKind::Get) => document(
            GPU_TYPE_GET,
            Variables::Id("gpuTypeId"),
            &["gpuTypes"],
            Extract::First,
        ),
        (ResourceKind::Gpu, OperationKind::Action(Action::Check)) => document(
            GPU_TYPE_AVAILABILITY,
            Variables::Flat("gpuTypeId"),
            &["gpuTypes"],
            Extract::First,
        ),
        (ResourceKind::Datacenter, OperationKind::List) => document(
            DATACENTER_AVAILABILITY,
            Variables::Empty,
            &["myself", "datacenters"],
            Extract::Many,
        ),
        (ResourceKind::Cpu, OperationKind::List) => {
            document(CPU_TYPES_LIST, Variables::Empty, &["cpuTypes"], Extract::Many)
        }
        (ResourceKind::Endpoint, OperationKind::Action(Action::JobStatus)) => document(
            JOB_STATUS,
            Variables::Flat("endpointId"),
            &["serverlessJob"],
            Extract::Receipt,
        ),
        (ResourceKind::Endpoint, OperationKind::Action(Action::JobCancel)) => document(
            JOB_CANCEL,
            Variables::Flat("endpointId"),
            &["cancelServerlessJob"],
            Extract::Receipt,
        ),
        _ => return None,
    };
    Some(found)
}
