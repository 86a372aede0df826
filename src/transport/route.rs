//! Static routing table from `(kind, operation)` to a transport channel.

use serde::Serialize;

use crate::resource::{Action, OperationKind, ResourceKind};

/// Backend surface used for an operation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Narrow REST surface with one typed call per operation.
    Typed,
    /// Query/mutation channel carrying opaque documents.
    Generic,
}

use Channel::{Generic, Typed};
use OperationKind::{Create, Delete, Get, List, Update};

const ROUTES: &[(ResourceKind, OperationKind, Channel)] = &[
    (ResourceKind::Pod, Create, Typed),
    (ResourceKind::Pod, Get, Typed),
    (ResourceKind::Pod, List, Typed),
    (ResourceKind::Pod, Update, Typed),
    (ResourceKind::Pod, Delete, Typed),
    (ResourceKind::Pod, OperationKind::Action(Action::Stop), Typed),
    (ResourceKind::Pod, OperationKind::Action(Action::Start), Typed),
    (ResourceKind::Pod, OperationKind::Action(Action::Restart), Typed),
    (ResourceKind::Endpoint, Create, Typed),
    (ResourceKind::Endpoint, Get, Typed),
    (ResourceKind::Endpoint, List, Typed),
    (ResourceKind::Endpoint, Update, Typed),
    (ResourceKind::Endpoint, Delete, Typed),
    (ResourceKind::Endpoint, OperationKind::Action(Action::Health), Typed),
    (ResourceKind::Endpoint, OperationKind::Action(Action::Run), Typed),
    (ResourceKind::Endpoint, OperationKind::Action(Action::RunSync), Typed),
    (ResourceKind::Endpoint, OperationKind::Action(Action::PurgeQueue), Typed),
    (ResourceKind::Endpoint, OperationKind::Action(Action::JobStatus), Generic),
    (ResourceKind::Endpoint, OperationKind::Action(Action::JobCancel), Generic),
    (ResourceKind::Volume, Create, Generic),
    (ResourceKind::Volume, Get, Generic),
    (ResourceKind::Volume, List, Generic),
    (ResourceKind::Volume, Update, Generic),
    (ResourceKind::Volume, Delete, Generic),
    (ResourceKind::Template, Create, Typed),
    (ResourceKind::Template, Get, Generic),
    (ResourceKind::Template, List, Generic),
    (ResourceKind::Template, Update, Generic),
    (ResourceKind::Template, Delete, Generic),
    (ResourceKind::Gpu, Get, Generic),
    (ResourceKind::Gpu, List, Generic),
    (ResourceKind::Gpu, OperationKind::Action(Action::Check), Generic),
    (ResourceKind::Datacenter, List, Generic),
    (ResourceKind::Cpu, List, Generic),
];

/// Returns the channel serving `operation` on `kind`, or `None` when the
/// pair is unsupported.
#[must_use]
pub fn route_for(kind: ResourceKind, operation: OperationKind) -> Option<Channel> {
    ROUTES
        .iter()
        .find(|(route_kind, route_operation, _)| *route_kind == kind && *route_operation == operation)
        .map(|(_, _, channel)| *channel)
}

/// Iterates every supported `(kind, operation, channel)` triple.
pub fn routes() -> impl Iterator<Item = (ResourceKind, OperationKind, Channel)> {
    ROUTES.iter().copied()
}
