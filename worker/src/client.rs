use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use common::{
    Task, TaskAssignmentRequest, TaskAssignmentResponse, TaskCompleteRequest,
    TaskCompleteResponse, WorkerHeartbeatRequest, WorkerHeartbeatResponse, WorkerId,
    WorkerRegisterRequest, WorkerRegisterResponse,
};
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Las cuatro operaciones que un worker puede invocar en el master.
#[async_trait]
pub trait CoordinatorClient: Send + Sync {
    async fn register(&self, addr: &str) -> Result<WorkerId>;
    async fn heartbeat(&self, req: WorkerHeartbeatRequest) -> Result<bool>;
    /// `None` si no hay tareas en este momento
    async fn request_task(&self, worker_id: WorkerId) -> Result<Option<Task>>;
    async fn report_task(&self, worker_id: WorkerId, task: &Task) -> Result<bool>;
}

/// Cliente HTTP/JSON contra las rutas /api/v1 del master.
pub struct HttpCoordinatorClient {
    client: Client,
    base_url: String,
}

impl HttpCoordinatorClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("POST {url} respondió {status}: {text}");
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl CoordinatorClient for HttpCoordinatorClient {
    async fn register(&self, addr: &str) -> Result<WorkerId> {
        let WorkerRegisterResponse { worker_id } = self
            .post(
                "/api/v1/workers/register",
                &WorkerRegisterRequest {
                    addr: addr.to_string(),
                },
            )
            .await?;
        Ok(worker_id)
    }

    async fn heartbeat(&self, req: WorkerHeartbeatRequest) -> Result<bool> {
        let WorkerHeartbeatResponse { ok } = self.post("/api/v1/workers/heartbeat", &req).await?;
        Ok(ok)
    }

    async fn request_task(&self, worker_id: WorkerId) -> Result<Option<Task>> {
        let TaskAssignmentResponse { task } = self
            .post("/api/v1/tasks/next", &TaskAssignmentRequest { worker_id })
            .await?;
        Ok(task)
    }

    async fn report_task(&self, worker_id: WorkerId, task: &Task) -> Result<bool> {
        let TaskCompleteResponse { ok } = self
            .post(
                "/api/v1/tasks/complete",
                &TaskCompleteRequest {
                    worker_id,
                    task_id: task.id,
                    kind: task.kind,
                },
            )
            .await?;
        Ok(ok)
    }
}
