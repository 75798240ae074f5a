use anyhow::{bail, Context, Result};
use common::engine::{run_map_task, run_reduce_task};
use common::{MapReduceApp, Task, TaskKind, WorkDirs, WorkerHeartbeatRequest, WorkerId, WordCount};
use std::{env, path::PathBuf, sync::Arc, time::Duration};
use sysinfo::{CpuExt, System, SystemExt};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::client::{CoordinatorClient, HttpCoordinatorClient};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);
const IDLE_BACKOFF: Duration = Duration::from_secs(2);

/// Configuración del worker (variables de entorno).
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub base_url: String,
    pub addr: String,
    pub dirs: WorkDirs,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let hostname = hostname::get()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        Self {
            base_url: env::var("MASTER_BASE_URL")
                .unwrap_or_else(|_| "http://master:8080".to_string()),
            addr: env::var("WORKER_ADDR").unwrap_or(hostname),
            dirs: WorkDirs {
                tmp_dir: PathBuf::from(
                    env::var("WORKER_TMP_DIR").unwrap_or_else(|_| "/data/tmp".to_string()),
                ),
                output_dir: PathBuf::from(
                    env::var("WORKER_OUTPUT_DIR").unwrap_or_else(|_| "/data/output".to_string()),
                ),
            },
        }
    }
}

/// Worker registrado en el master.
/// Corre dos loops en paralelo: heartbeats y pedir/ejecutar tareas.
pub struct Worker<C, A> {
    id: WorkerId,
    client: Arc<C>,
    app: Arc<A>,
    dirs: WorkDirs,
}

impl<C, A> Worker<C, A>
where
    C: CoordinatorClient + 'static,
    A: MapReduceApp + 'static,
{
    pub async fn register(client: Arc<C>, app: Arc<A>, dirs: WorkDirs, addr: &str) -> Result<Self> {
        let id = client
            .register(addr)
            .await
            .context("no se pudo registrar en el master")?;
        info!("worker registrado con id = {} ({})", id, addr);
        Ok(Self {
            id,
            client,
            app,
            dirs,
        })
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Ejecuta map o reduce en un hilo de bloqueo. Cualquier error es fatal.
    async fn execute(&self, task: &Task) -> Result<()> {
        let app = self.app.clone();
        let dirs = self.dirs.clone();
        let t = task.clone();

        tokio::task::spawn_blocking(move || match t.kind {
            TaskKind::Map => run_map_task(&*app, &t, &dirs).map(|parts| {
                debug!("map {} escribió {} particiones", t.id, parts.len());
            }),
            TaskKind::Reduce => run_reduce_task(&*app, &t, &dirs).map(|out| {
                debug!("reduce {} escribió {}", t.id, out.display());
            }),
        })
        .await
        .context("panic o join error ejecutando la tarea")?
        .with_context(|| format!("tarea {} ({:?}) falló", task.id, task.kind))
    }

    /// Una vuelta del loop: pide tarea, la ejecuta y la reporta.
    /// Devuelve `false` si no había tarea.
    pub async fn run_once(&self) -> Result<bool> {
        let Some(task) = self.client.request_task(self.id).await? else {
            return Ok(false);
        };

        info!(
            "worker {}: procesando tarea {} ({:?}) input={:?}",
            self.id, task.id, task.kind, task.input_path
        );
        self.execute(&task).await?;

        let ack = self.client.report_task(self.id, &task).await?;
        if ack {
            info!(
                "worker {}: tarea {} ({:?}) reportada como completada",
                self.id, task.id, task.kind
            );
        } else {
            warn!("worker {}: el master no confirmó la tarea {}", self.id, task.id);
        }
        Ok(true)
    }

    pub async fn run_task_loop(&self) -> Result<()> {
        loop {
            if !self.run_once().await? {
                debug!("worker {} pidió tarea pero no hay, esperando", self.id);
                sleep(IDLE_BACKOFF).await;
            }
        }
    }

    /// Heartbeat periódico con CPU/MEM. Si falla o el master no nos reconoce
    /// se pierde la coordinación y el worker termina.
    pub async fn run_heartbeat_loop(&self) -> Result<()> {
        let mut sys = System::new();
        loop {
            sys.refresh_cpu();
            sys.refresh_memory();

            let req = WorkerHeartbeatRequest {
                worker_id: self.id,
                cpu_percent: Some(sys.global_cpu_info().cpu_usage()),
                mem_bytes: Some(sys.used_memory()),
            };
            let ok = self
                .client
                .heartbeat(req)
                .await
                .context("heartbeat al master falló")?;
            if !ok {
                bail!("el master no reconoce al worker {}", self.id);
            }

            sleep(HEARTBEAT_INTERVAL).await;
        }
    }

    /// Corre hasta que alguno de los dos loops falle.
    pub async fn run(&self) -> Result<()> {
        tokio::select! {
            res = self.run_heartbeat_loop() => res,
            res = self.run_task_loop() => res,
        }
    }
}

pub async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("worker=debug,common=debug")),
        )
        .init();

    let config = WorkerConfig::from_env();
    let client = Arc::new(HttpCoordinatorClient::new(&config.base_url)?);

    let worker = Worker::register(client, Arc::new(WordCount), config.dirs, &config.addr).await?;
    info!("worker {} trabajando contra {}", worker.id(), config.base_url);

    let res = worker.run().await;
    if let Err(ref e) = res {
        error!("worker {} termina: {:#}", worker.id(), e);
    }
    res
}
