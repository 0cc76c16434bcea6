use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{Job, JobType};
use crate::error::HandlerError;
use crate::typed::{TypedHandler, TypedJob, TypedJobHandler};

/// A handler for a specific job type.
///
/// Takes the whole `Job` so the handler can decode the payload as it likes.
/// `Ok(())` is success, `Err` is a failed attempt.
///
/// The queue delivers at-least-once: a job may be handed to its handler
/// again after a crash or a failed attempt, so handlers must be idempotent.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), HandlerError>;
}

/// Adapter turning an async closure into a [`JobHandler`].
pub struct FnHandler<F> {
    f: F,
}

/// Wrap `f` as a handler.
///
/// ```ignore
/// registry.register("sync_contacts", handler_fn(|job| async move {
///     sync_contacts(&job.payload).await.map_err(HandlerError::new)
/// }));
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn JobHandler>
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(Job) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, job: &Job) -> Result<(), HandlerError> {
        (self.f)(job.clone()).await
    }
}

/// Registry of handlers (job_type -> handler).
///
/// Built explicitly by the composition root; there is no ambient
/// registration. Registering a type again replaces the previous handler.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a job type, returning the one it replaced.
    pub fn register(
        &mut self,
        job_type: impl Into<JobType>,
        handler: Arc<dyn JobHandler>,
    ) -> Option<Arc<dyn JobHandler>> {
        self.handlers.insert(job_type.into(), handler)
    }

    /// Register a typed handler under `T::TYPE`.
    pub fn register_typed<T, H>(&mut self, handler: H) -> Option<Arc<dyn JobHandler>>
    where
        T: TypedJob,
        H: TypedJobHandler<T> + 'static,
    {
        self.register(T::TYPE, Arc::new(TypedHandler::<T, H>::new(handler)))
    }

    /// Returns `true` if a handler was removed.
    pub fn unregister(&mut self, job_type: &JobType) -> bool {
        self.handlers.remove(job_type).is_some()
    }

    pub fn get(&self, job_type: &JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn contains(&self, job_type: &JobType) -> bool {
        self.handlers.contains_key(job_type)
    }

    pub fn registered_types(&self) -> Vec<JobType> {
        let mut types: Vec<JobType> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
