//! Client-side filtering and ordering of capacity listings.
//!
//! The query channel returns every GPU type and datacenter at once. The
//! narrowing the `capacity` commands offer happens here, over normalized
//! [`Resource`] values, so it needs no extra round trips.

use std::cmp::Ordering;

use serde_json::Value;

use crate::error::ApiError;
use crate::resource::Resource;

/// Fewest GPU types a comparison accepts.
pub const MIN_COMPARED: usize = 2;

/// Stock status the backend reports for GPU types that cannot be rented.
const UNAVAILABLE: &str = "unavailable";

/// Which cloud a GPU type must be offered in.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CloudFilter {
    /// Either cloud.
    #[default]
    All,
    /// Secure cloud only.
    Secure,
    /// Community cloud only.
    Community,
}

impl CloudFilter {
    fn admits(self, gpu: &Resource) -> bool {
        match self {
            Self::All => true,
            Self::Secure => flag(gpu, "secureCloud"),
            Self::Community => flag(gpu, "communityCloud"),
        }
    }
}

/// Ordering applied to GPU listings.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum GpuSort {
    /// Cheapest on-demand price first; unpriced types last.
    #[default]
    Price,
    /// Most memory first.
    Vram,
    /// Display name, ignoring case.
    Name,
    /// Largest fleet first.
    Availability,
}

/// Filters and ordering for a GPU listing.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct GpuQuery {
    /// Cloud restriction.
    pub cloud: CloudFilter,
    /// Minimum memory per GPU in GB. Zero means no minimum.
    pub min_vram_gb: Option<u64>,
    /// Drop types whose stock is reported as unavailable or not reported.
    pub available_only: bool,
    /// Ordering of the result.
    pub sort: GpuSort,
}

impl GpuQuery {
    /// Applies the filters to `gpus` and sorts what remains.
    #[must_use]
    pub fn apply(&self, gpus: Vec<Resource>) -> Vec<Resource> {
        let min_vram = self.min_vram_gb.unwrap_or(0);
        let mut kept: Vec<Resource> = gpus
            .into_iter()
            .filter(|gpu| self.cloud.admits(gpu))
            .filter(|gpu| min_vram == 0 || memory_gb(gpu) >= min_vram)
            .filter(|gpu| !self.available_only || in_stock(gpu))
            .collect();
        match self.sort {
            GpuSort::Price => kept.sort_by(|a, b| on_demand_price(a).total_cmp(&on_demand_price(b))),
            GpuSort::Vram => kept.sort_by(|a, b| memory_gb(b).cmp(&memory_gb(a))),
            GpuSort::Name => kept.sort_by_key(display_name),
            GpuSort::Availability => kept.sort_by(by_fleet_size),
        }
        kept
    }
}

/// Keeps datacenters that list `gpu` in their availability, matched as a
/// case-insensitive substring of the type id or display name, and orders
/// the result by datacenter id.
#[must_use]
pub fn offering(datacenters: Vec<Resource>, gpu: Option<&str>) -> Vec<Resource> {
    let needle = gpu.map(str::to_lowercase);
    let mut kept: Vec<Resource> = datacenters
        .into_iter()
        .filter(|datacenter| {
            needle
                .as_deref()
                .is_none_or(|wanted| lists_gpu(datacenter, wanted))
        })
        .collect();
    kept.sort_by(|a, b| a.id.cmp(&b.id));
    kept
}

fn lists_gpu(datacenter: &Resource, wanted: &str) -> bool {
    datacenter
        .attribute("gpuAvailability")
        .and_then(Value::as_array)
        .is_some_and(|entries| {
            entries.iter().any(|entry| {
                ["gpuTypeId", "gpuTypeDisplayName"].iter().any(|key| {
                    entry
                        .get(key)
                        .and_then(Value::as_str)
                        .is_some_and(|name| name.to_lowercase().contains(wanted))
                })
            })
        })
}

/// Rejects comparisons of fewer than [`MIN_COMPARED`] GPU types.
///
/// # Errors
///
/// Returns [`ApiError::Validation`] naming the `gpus` argument.
pub fn check_comparison(wanted: &[String]) -> Result<(), ApiError> {
    if wanted.len() < MIN_COMPARED {
        return Err(ApiError::validation(
            "gpus",
            format!("provide at least {MIN_COMPARED} GPU types to compare"),
        ));
    }
    Ok(())
}

/// Keeps the GPU types named in `wanted` by id or display name, ignoring
/// case, in listing order.
#[must_use]
pub fn select(gpus: Vec<Resource>, wanted: &[String]) -> Vec<Resource> {
    let wanted: Vec<String> = wanted.iter().map(|name| name.to_lowercase()).collect();
    gpus.into_iter()
        .filter(|gpu| {
            wanted
                .iter()
                .any(|name| *name == gpu.id.to_lowercase() || *name == display_name(gpu))
        })
        .collect()
}

fn flag(resource: &Resource, key: &str) -> bool {
    resource
        .attribute(key)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn memory_gb(gpu: &Resource) -> u64 {
    gpu.attribute("memoryInGb")
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

fn in_stock(gpu: &Resource) -> bool {
    gpu.attribute("lowestPrice.stockStatus")
        .and_then(Value::as_str)
        .is_some_and(|status| !status.is_empty() && !status.eq_ignore_ascii_case(UNAVAILABLE))
}

fn on_demand_price(gpu: &Resource) -> f64 {
    gpu.attribute("lowestPrice.uninterruptablePrice")
        .and_then(Value::as_f64)
        .unwrap_or(f64::INFINITY)
}

fn display_name(gpu: &Resource) -> String {
    gpu.attribute("displayName")
        .and_then(Value::as_str)
        .unwrap_or(&gpu.id)
        .to_lowercase()
}

fn by_fleet_size(a: &Resource, b: &Resource) -> Ordering {
    let total = |gpu: &Resource| {
        gpu.attribute("lowestPrice.totalCount")
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };
    total(b).cmp(&total(a))
}
