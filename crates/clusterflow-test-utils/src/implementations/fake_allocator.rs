//! Resource allocator that hands out sequential hosts.

use async_trait::async_trait;
use clusterflow_core::{AllocationResult, CoreError, HostAssignment, ResourceAllocator, TopologyDemand};
use parking_lot::Mutex;

/// Allocator assigning `10.0.0.N` hosts in demand order
#[derive(Default)]
pub struct FakeResourceAllocator {
    next_host: Mutex<u32>,
    demands: Mutex<Vec<TopologyDemand>>,
    released: Mutex<Vec<String>>,
    fail_with: Mutex<Option<String>>,
}

impl FakeResourceAllocator {
    /// Create an allocator with unlimited capacity
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every allocation with `reason`
    pub fn exhausted(reason: &str) -> Self {
        let allocator = Self::default();
        *allocator.fail_with.lock() = Some(reason.to_string());
        allocator
    }

    /// Demands received so far
    pub fn demands(&self) -> Vec<TopologyDemand> {
        self.demands.lock().clone()
    }

    /// Clusters released so far
    pub fn released(&self) -> Vec<String> {
        self.released.lock().clone()
    }
}

#[async_trait]
impl ResourceAllocator for FakeResourceAllocator {
    async fn allocate(&self, demand: &TopologyDemand) -> Result<AllocationResult, CoreError> {
        self.demands.lock().push(demand.clone());
        if let Some(reason) = self.fail_with.lock().clone() {
            return Err(CoreError::AllocationError(reason));
        }

        let mut next_host = self.next_host.lock();
        let mut hosts = Vec::new();
        for component in &demand.components {
            for item in &component.distribution {
                for _ in 0..item.count {
                    *next_host += 1;
                    let n = *next_host;
                    hosts.push(HostAssignment {
                        component_type: component.component_type.clone(),
                        host_id: format!("host-{}", n),
                        ip: format!("10.0.0.{}", n),
                        ports: vec![4000, 10080],
                        zone_code: item.zone_code.clone(),
                        spec_code: item.spec_code.clone(),
                        disk_path: format!("/data/{}", demand.cluster_id),
                    });
                }
            }
        }

        Ok(AllocationResult { hosts })
    }

    async fn release(&self, cluster_id: &str) -> Result<(), CoreError> {
        self.released.lock().push(cluster_id.to_string());
        Ok(())
    }
}
