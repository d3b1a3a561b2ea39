//! Data-plane operations on buckets and objects.

use async_trait::async_trait;
use bytes::Bytes;
use rand::RngCore;
use uuid::Uuid;

use crate::endpoint::Endpoint;
use crate::error::OperationError;
use crate::listener::WorkloadEventListener;
use crate::operation::Operation;

/// IO units charged for one object put: metadata write, data write, commit.
pub const CREATE_OBJECT_IO_COST: u64 = 3;

pub struct CreateBucket {
    bucket: String,
}

impl CreateBucket {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl Operation for CreateBucket {
    fn description(&self) -> String {
        format!("create bucket {}", self.bucket)
    }

    async fn execute(
        &self,
        endpoint: &dyn Endpoint,
        _listener: &dyn WorkloadEventListener,
    ) -> Result<(), OperationError> {
        endpoint.object_api()?.create_bucket(&self.bucket).await?;
        Ok(())
    }
}

pub struct DeleteBucket {
    bucket: String,
}

impl DeleteBucket {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl Operation for DeleteBucket {
    fn description(&self) -> String {
        format!("delete bucket {}", self.bucket)
    }

    async fn execute(
        &self,
        endpoint: &dyn Endpoint,
        _listener: &dyn WorkloadEventListener,
    ) -> Result<(), OperationError> {
        endpoint.object_api()?.delete_bucket(&self.bucket).await?;
        Ok(())
    }
}

/// Puts one object with a random key and random content.
///
/// When `report` is set, the put is charged to the bucket's volume with
/// [`CREATE_OBJECT_IO_COST`]; the volume must then be running in the listener.
pub struct CreateObject {
    bucket: String,
    size: usize,
    report: bool,
}

impl CreateObject {
    pub fn new(bucket: impl Into<String>, size: usize) -> Self {
        Self {
            bucket: bucket.into(),
            size,
            report: false,
        }
    }

    pub fn reporting(mut self) -> Self {
        self.report = true;
        self
    }

    fn content(&self) -> Bytes {
        let mut buf = vec![0u8; self.size];
        rand::thread_rng().fill_bytes(&mut buf);
        Bytes::from(buf)
    }
}

#[async_trait]
impl Operation for CreateObject {
    fn description(&self) -> String {
        format!("create object in {}", self.bucket)
    }

    async fn execute(
        &self,
        endpoint: &dyn Endpoint,
        listener: &dyn WorkloadEventListener,
    ) -> Result<(), OperationError> {
        let key = Uuid::new_v4().to_string();
        let content = self.content();
        endpoint
            .object_api()?
            .put_object(&self.bucket, &key, content)
            .await?;
        if self.report {
            listener.report_io(&self.bucket, CREATE_OBJECT_IO_COST)?;
        }
        Ok(())
    }
}
