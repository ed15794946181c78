//! Simulated collaborators for running the daemon without real hosts.

use async_trait::async_trait;
use clusterflow_core::{
    AllocationResult, CoreError, HostAssignment, OperationExecutor, OperationHandle,
    OperationParams, OperationStatus, ResourceAllocator, TopologyDemand,
};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use crate::domain::spec_code::SpecCode;
use crate::topology::{COMPONENT_PD, COMPONENT_TIDB, COMPONENT_TIKV};

fn ports_for(component_type: &str) -> Vec<u16> {
    if component_type.eq_ignore_ascii_case(COMPONENT_PD) {
        vec![2379, 2380]
    } else if component_type.eq_ignore_ascii_case(COMPONENT_TIDB) {
        vec![4000, 10080]
    } else if component_type.eq_ignore_ascii_case(COMPONENT_TIKV) {
        vec![20160, 20180]
    } else {
        vec![9000, 9001]
    }
}

/// Allocator handing out hosts from a fixed-size local pool
pub struct LocalResourceAllocator {
    capacity: usize,
    next_host: AtomicU64,
    held: DashMap<String, Vec<HostAssignment>>,
}

impl LocalResourceAllocator {
    /// Pool of `capacity` hosts
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_host: AtomicU64::new(0),
            held: DashMap::new(),
        }
    }

    /// Hosts not currently held by any cluster
    pub fn available(&self) -> usize {
        let held: usize = self.held.iter().map(|entry| entry.value().len()).sum();
        self.capacity.saturating_sub(held)
    }
}

#[async_trait]
impl ResourceAllocator for LocalResourceAllocator {
    async fn allocate(&self, demand: &TopologyDemand) -> Result<AllocationResult, CoreError> {
        let mut requested = 0usize;
        for component in &demand.components {
            for item in &component.distribution {
                item.spec_code
                    .parse::<SpecCode>()
                    .map_err(|e| CoreError::AllocationError(e.to_string()))?;
                requested += item.count as usize;
            }
        }

        let available = self.available();
        if requested > available {
            return Err(CoreError::AllocationError(format!(
                "insufficient hosts: requested {}, available {}",
                requested, available
            )));
        }

        let mut hosts = Vec::with_capacity(requested);
        for component in &demand.components {
            for item in &component.distribution {
                for _ in 0..item.count {
                    let n = self.next_host.fetch_add(1, Ordering::SeqCst) + 1;
                    hosts.push(HostAssignment {
                        component_type: component.component_type.clone(),
                        host_id: format!("local-{}", n),
                        ip: format!("192.168.{}.{}", n / 256, n % 256),
                        ports: ports_for(&component.component_type),
                        zone_code: item.zone_code.clone(),
                        spec_code: item.spec_code.clone(),
                        disk_path: format!("/data/{}", demand.cluster_id),
                    });
                }
            }
        }

        self.held
            .entry(demand.cluster_id.clone())
            .or_default()
            .extend(hosts.iter().cloned());
        info!(cluster_id = %demand.cluster_id, hosts = hosts.len(), "Allocated local hosts");
        Ok(AllocationResult { hosts })
    }

    async fn release(&self, cluster_id: &str) -> Result<(), CoreError> {
        if let Some((_, hosts)) = self.held.remove(cluster_id) {
            info!(cluster_id, hosts = hosts.len(), "Released local hosts");
        }
        Ok(())
    }
}

/// Operation executor whose actions finish after a number of status checks
pub struct LocalOperationExecutor {
    checks_to_complete: u32,
    sequence: AtomicU64,
    running: DashMap<String, u32>,
}

impl LocalOperationExecutor {
    /// Actions report `Pending` for `checks_to_complete` checks, then `Success`
    pub fn new(checks_to_complete: u32) -> Self {
        Self {
            checks_to_complete,
            sequence: AtomicU64::new(0),
            running: DashMap::new(),
        }
    }
}

#[async_trait]
impl OperationExecutor for LocalOperationExecutor {
    async fn invoke(&self, params: &OperationParams) -> Result<OperationHandle, CoreError> {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = format!("local-{}-{}-{}", params.kind, params.cluster_id, n);
        self.running.insert(handle.clone(), self.checks_to_complete);
        info!(cluster_id = %params.cluster_id, operation = %params.kind, handle = %handle, "Started local operation");
        Ok(OperationHandle(handle))
    }

    async fn check_status(&self, handle: &OperationHandle) -> Result<OperationStatus, CoreError> {
        // Handles from before a restart are unknown to this process.
        let Some(mut remaining) = self.running.get_mut(&handle.0) else {
            return Ok(OperationStatus::Failed(format!("unknown operation {}", handle)));
        };

        if *remaining == 0 {
            return Ok(OperationStatus::Success);
        }
        *remaining -= 1;
        debug!(handle = %handle, remaining = *remaining, "Local operation still running");
        Ok(OperationStatus::Pending)
    }
}
