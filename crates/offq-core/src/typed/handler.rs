//! TypedJobHandler - payload をデコードしてから実行する Handler
//!
//! # 学習ポイント
//! - ジェネリック trait (TypedJobHandler<T>)
//! - Type erasure パターン (TypedHandler<T, H> → dyn JobHandler)

use std::marker::PhantomData;

use async_trait::async_trait;

use super::job::TypedJob;
use crate::domain::Job;
use crate::error::HandlerError;
use crate::runtime::JobHandler;

/// TypedJobHandler は decode 済みの payload を受け取る
///
/// `job` は retry_count などのメタデータ参照用。
#[async_trait]
pub trait TypedJobHandler<T: TypedJob>: Send + Sync {
    async fn handle(&self, payload: T, job: &Job) -> Result<(), HandlerError>;
}

/// TypedJobHandler<T> を object-safe な JobHandler に変換するアダプタ
///
/// Decode failures count as failed attempts: a payload that cannot be
/// decoded is retried and eventually fails like any other error.
pub struct TypedHandler<T: TypedJob, H: TypedJobHandler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: TypedJob, H: TypedJobHandler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: TypedJob, H: TypedJobHandler<T>> JobHandler for TypedHandler<T, H> {
    async fn handle(&self, job: &Job) -> Result<(), HandlerError> {
        let value = serde_json::Value::Object(job.payload.clone());
        let payload: T = serde_json::from_value(value)?;
        self.handler.handle(payload, job).await
    }
}
