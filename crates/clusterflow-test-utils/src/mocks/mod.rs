//! mockall mocks for the collaborator traits.

use async_trait::async_trait;
use clusterflow_core::{
    AllocationResult, CoreError, OperationExecutor, OperationHandle, OperationParams,
    OperationStatus, ResourceAllocator, TopologyDemand,
};
use mockall::mock;

mock! {
    pub ResourceAllocator {}

    #[async_trait]
    impl ResourceAllocator for ResourceAllocator {
        async fn allocate(&self, demand: &TopologyDemand) -> Result<AllocationResult, CoreError>;
        async fn release(&self, cluster_id: &str) -> Result<(), CoreError>;
    }
}

mock! {
    pub OperationExecutor {}

    #[async_trait]
    impl OperationExecutor for OperationExecutor {
        async fn invoke(&self, params: &OperationParams) -> Result<OperationHandle, CoreError>;
        async fn check_status(&self, handle: &OperationHandle) -> Result<OperationStatus, CoreError>;
    }
}

/// Operation executor mock whose actions finish on the first status check
pub fn create_mock_operation_executor() -> MockOperationExecutor {
    let mut mock = MockOperationExecutor::new();

    mock.expect_invoke()
        .returning(|params| Ok(OperationHandle(format!("{}-{}", params.kind, params.cluster_id))));

    mock.expect_check_status()
        .returning(|_| Ok(OperationStatus::Success));

    mock
}
