use super::{AdaptorFactory, CommandOutput, ExecutionAdaptor};
use crate::catalog::Credential;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::{JobSubmissionProtocol, ProcessSpec};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, Semaphore};

/// Cache key of an adaptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdaptorKey {
    pub resource_id: String,
    pub protocol: JobSubmissionProtocol,
    pub credential_token: String,
}

impl AdaptorKey {
    pub fn for_process(spec: &ProcessSpec) -> Self {
        Self {
            resource_id: spec.compute_resource.resource_id.clone(),
            protocol: spec.protocol(),
            credential_token: spec.credential_token.clone(),
        }
    }
}

type AdaptorCell = Arc<OnceCell<Arc<dyn ExecutionAdaptor>>>;

/// Adaptor cache with a per-resource concurrency bound
///
/// Excess commands against one resource wait for a permit rather than fail.
/// Concurrent first requests for the same key share a single creation.
pub struct AdaptorPool {
    factory: Arc<dyn AdaptorFactory>,
    adaptors: DashMap<AdaptorKey, AdaptorCell>,
    limits: DashMap<String, Arc<Semaphore>>,
    max_concurrent_per_resource: usize,
}

impl std::fmt::Debug for AdaptorPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptorPool")
            .field("cached", &self.adaptors.len())
            .field("max_concurrent_per_resource", &self.max_concurrent_per_resource)
            .finish()
    }
}

impl AdaptorPool {
    pub fn new(factory: Arc<dyn AdaptorFactory>, max_concurrent_per_resource: usize) -> Self {
        Self {
            factory,
            adaptors: DashMap::new(),
            limits: DashMap::new(),
            max_concurrent_per_resource: max_concurrent_per_resource.max(1),
        }
    }

    /// Cached adaptor for the process's (resource, protocol, credential)
    pub async fn acquire(
        &self,
        spec: &ProcessSpec,
        credential: &Credential,
    ) -> OrchestratorResult<Arc<dyn ExecutionAdaptor>> {
        let key = AdaptorKey::for_process(spec);
        let cell = self
            .adaptors
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let inner = cell
            .get_or_try_init(|| {
                self.factory.create(
                    &spec.compute_resource,
                    &spec.gateway_id,
                    &spec.user_id,
                    credential,
                )
            })
            .await?
            .clone();

        Ok(Arc::new(PooledAdaptor {
            inner,
            limit: self.limit_for(&key.resource_id),
        }))
    }

    fn limit_for(&self, resource_id: &str) -> Arc<Semaphore> {
        self.limits
            .entry(resource_id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_concurrent_per_resource)))
            .clone()
    }

    /// Drop a cached adaptor, e.g. after its session broke
    pub async fn invalidate(&self, key: &AdaptorKey) {
        if let Some((_, cell)) = self.adaptors.remove(key) {
            if let Some(adaptor) = cell.get() {
                adaptor.close().await;
            }
            tracing::info!(resource_id = %key.resource_id, protocol = %key.protocol, "Adaptor evicted");
        }
    }

    pub fn cached_adaptors(&self) -> usize {
        self.adaptors.iter().filter(|e| e.value().initialized()).count()
    }

    pub fn available_permits(&self, resource_id: &str) -> usize {
        self.limits
            .get(resource_id)
            .map(|s| s.available_permits())
            .unwrap_or(self.max_concurrent_per_resource)
    }

    /// Close every cached adaptor
    pub async fn shutdown(&self) {
        let cells: Vec<AdaptorCell> = self.adaptors.iter().map(|e| e.value().clone()).collect();
        self.adaptors.clear();
        for cell in cells {
            if let Some(adaptor) = cell.get() {
                adaptor.close().await;
            }
        }
    }
}

/// Adaptor handle that takes a resource permit around every call
struct PooledAdaptor {
    inner: Arc<dyn ExecutionAdaptor>,
    limit: Arc<Semaphore>,
}

impl PooledAdaptor {
    async fn permit(&self) -> OrchestratorResult<tokio::sync::SemaphorePermit<'_>> {
        self.limit
            .acquire()
            .await
            .map_err(|_| OrchestratorError::AdaptorInit {
                resource_id: self.inner.resource_id().to_string(),
                reason: "adaptor pool closed".to_string(),
            })
    }
}

#[async_trait]
impl ExecutionAdaptor for PooledAdaptor {
    fn resource_id(&self) -> &str {
        self.inner.resource_id()
    }

    async fn run_command(
        &self,
        command: &str,
        working_dir: Option<&str>,
        timeout: Duration,
    ) -> OrchestratorResult<CommandOutput> {
        let _permit = self.permit().await?;
        self.inner.run_command(command, working_dir, timeout).await
    }

    async fn execute_command(
        &self,
        command: &str,
        working_dir: Option<&str>,
        timeout: Duration,
    ) -> OrchestratorResult<CommandOutput> {
        let _permit = self.permit().await?;
        self.inner.execute_command(command, working_dir, timeout).await
    }

    async fn create_directory(&self, path: &str, timeout: Duration) -> OrchestratorResult<()> {
        let _permit = self.permit().await?;
        self.inner.create_directory(path, timeout).await
    }

    async fn copy_file_to(
        &self,
        local_path: &str,
        remote_path: &str,
        timeout: Duration,
    ) -> OrchestratorResult<()> {
        let _permit = self.permit().await?;
        self.inner.copy_file_to(local_path, remote_path, timeout).await
    }

    async fn copy_file_from(
        &self,
        remote_path: &str,
        local_path: &str,
        timeout: Duration,
    ) -> OrchestratorResult<()> {
        let _permit = self.permit().await?;
        self.inner.copy_file_from(remote_path, local_path, timeout).await
    }

    async fn list_directory(
        &self,
        path: &str,
        timeout: Duration,
    ) -> OrchestratorResult<Vec<String>> {
        let _permit = self.permit().await?;
        self.inner.list_directory(path, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptors::LocalAdaptor;
    use crate::models::{
        ApplicationSpec, ComputeResource, ResourceManagerKind, ResourceScheduling,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[derive(Default)]
    struct CountingFactory {
        created: AtomicUsize,
    }

    #[async_trait]
    impl AdaptorFactory for CountingFactory {
        async fn create(
            &self,
            resource: &ComputeResource,
            _gateway_id: &str,
            _user_id: &str,
            _credential: &Credential,
        ) -> OrchestratorResult<Arc<dyn ExecutionAdaptor>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(LocalAdaptor::new(resource.resource_id.clone())))
        }
    }

    fn spec(token: &str) -> ProcessSpec {
        ProcessSpec {
            process_id: "P".into(),
            experiment_id: "E".into(),
            gateway_id: "gw".into(),
            user_id: "alice".into(),
            compute_resource: ComputeResource {
                resource_id: "localhost".into(),
                host: "localhost".into(),
                port: 22,
                resource_manager: ResourceManagerKind::Local,
                protocol: JobSubmissionProtocol::Local,
                max_wall_time_minutes: None,
            },
            credential_token: token.into(),
            working_directory: "/tmp/p".into(),
            storage_directory: "/tmp/s".into(),
            scheduling: ResourceScheduling {
                node_count: 1,
                cpu_count: 1,
                queue_name: None,
                wall_time_minutes: 5,
                total_memory_mb: None,
                account: None,
            },
            application: ApplicationSpec::default(),
            inputs: vec![],
            outputs: vec![],
            notification_email: None,
            cleanup_working_directory: false,
        }
    }

    #[tokio::test]
    async fn test_adaptors_are_cached_per_key() {
        let factory = Arc::new(CountingFactory::default());
        let pool = AdaptorPool::new(factory.clone(), 4);
        let credential = Credential::new("a", "alice");

        pool.acquire(&spec("a"), &credential).await.unwrap();
        pool.acquire(&spec("a"), &credential).await.unwrap();
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);

        pool.acquire(&spec("b"), &credential).await.unwrap();
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
        assert_eq!(pool.cached_adaptors(), 2);

        pool.invalidate(&AdaptorKey::for_process(&spec("a"))).await;
        pool.acquire(&spec("a"), &credential).await.unwrap();
        assert_eq!(factory.created.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_excess_commands_wait_for_a_permit() {
        let pool = AdaptorPool::new(Arc::new(CountingFactory::default()), 1);
        let credential = Credential::new("a", "alice");
        let first = pool.acquire(&spec("a"), &credential).await.unwrap();
        let second = pool.acquire(&spec("a"), &credential).await.unwrap();

        let started = Instant::now();
        let timeout = Duration::from_secs(5);
        let (a, b) = tokio::join!(
            first.execute_command("sleep 0.2", None, timeout),
            second.execute_command("sleep 0.2", None, timeout),
        );
        a.unwrap();
        b.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(400));
        assert_eq!(pool.available_permits("localhost"), 1);
    }
}
