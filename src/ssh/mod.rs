//! SSH connection details for running pods.
//!
//! A pod exposes SSH through a public TCP port mapping for container port
//! 22. Pods without one are still reachable through the provider's SSH
//! proxy on port 22.

use std::ffi::OsString;

use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::resource::Resource;

/// SSH client invoked by `ssh connect`.
pub const SSH_PROGRAM: &str = "ssh";

/// Default login user on provider images.
pub const DEFAULT_USER: &str = "root";

const CONTAINER_SSH_PORT: u64 = 22;
const PROXY_DOMAIN: &str = "ssh.proxy.runpod.net";

/// Where to connect for a pod.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SshEndpoint {
    /// Public address or proxy hostname.
    pub host: String,
    /// Public port.
    pub port: u16,
}

impl SshEndpoint {
    /// Resolves the endpoint for a fetched pod.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Rejected`] when the pod is not running.
    pub fn for_pod(pod: &Resource) -> Result<Self, ApiError> {
        if !pod.status.eq_ignore_ascii_case("RUNNING") {
            return Err(ApiError::Rejected {
                status: None,
                detail: format!(
                    "pod {id} is not running (status: {status}); start it with `rpctl pod start {id}`",
                    id = pod.id,
                    status = pod.status,
                ),
            });
        }
        Ok(public_mapping(pod).unwrap_or_else(|| Self {
            host: format!("{}-{PROXY_DOMAIN}", pod.id),
            port: 22,
        }))
    }
}

fn public_mapping(pod: &Resource) -> Option<SshEndpoint> {
    pod.attribute("runtime.ports")?
        .as_array()?
        .iter()
        .filter(|entry| entry.get("privatePort").and_then(Value::as_u64) == Some(CONTAINER_SSH_PORT))
        .find_map(|entry| {
            let host = entry
                .get("ip")
                .and_then(Value::as_str)
                .filter(|ip| !ip.is_empty())?;
            let port = entry
                .get("publicPort")
                .and_then(Value::as_u64)
                .and_then(|port| u16::try_from(port).ok())
                .unwrap_or(22);
            Some(SshEndpoint {
                host: host.to_owned(),
                port,
            })
        })
}

/// Options for the SSH client.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshOptions {
    /// Login user.
    pub user: String,
    /// Private key passed with `-i`.
    pub identity: Option<String>,
    /// Command to run instead of an interactive shell.
    pub remote_command: Option<String>,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            user: String::from(DEFAULT_USER),
            identity: None,
            remote_command: None,
        }
    }
}

impl SshOptions {
    /// Builds the argument list for [`SSH_PROGRAM`]. Host keys are not
    /// checked because pod addresses are reused.
    #[must_use]
    pub fn args(&self, endpoint: &SshEndpoint) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-p"),
            OsString::from(endpoint.port.to_string()),
        ];
        if let Some(identity) = &self.identity {
            args.push(OsString::from("-i"));
            args.push(OsString::from(identity));
        }
        args.extend([
            OsString::from("-o"),
            OsString::from("StrictHostKeyChecking=no"),
            OsString::from("-o"),
            OsString::from("UserKnownHostsFile=/dev/null"),
            OsString::from(format!("{}@{}", self.user, endpoint.host)),
        ]);
        if let Some(command) = &self.remote_command {
            args.push(OsString::from(command));
        }
        args
    }
}
