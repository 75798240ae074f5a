use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard},
    time::SystemTime,
};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::job::{JobId, JobInfo, JobPhase};
use crate::queue::{QueueFull, TaskQueue};
use crate::task::{Task, TaskId, TaskKind, TaskState};
use crate::worker::{WorkerId, WorkerMetrics};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("tarea {kind:?} {task_id} no encontrada")]
    TaskNotFound { kind: TaskKind, task_id: TaskId },

    #[error("tarea {kind:?} {task_id} pertenece al worker {owner:?}, no al {reporter}")]
    OwnerMismatch {
        kind: TaskKind,
        task_id: TaskId,
        owner: Option<WorkerId>,
        reporter: WorkerId,
    },

    #[error("ya hay un job enviado (fase {phase:?})")]
    JobAlreadySubmitted { phase: JobPhase },

    #[error("job inválido: {0}")]
    InvalidJob(String),

    #[error(transparent)]
    QueueFull(#[from] QueueFull),
}

#[derive(Debug, Clone)]
struct WorkerMeta {
    addr: String,
    last_heartbeat: SystemTime,
    tasks_completed: u64,
    last_cpu_percent: Option<f32>,
    last_mem_bytes: Option<u64>,
}

#[derive(Debug, Clone)]
struct JobMeta {
    id: JobId,
    name: String,
    submitted_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

/// Todo el estado mutable compartido, protegido por un único lock.
struct CoordinatorState {
    phase: JobPhase,
    workers: HashMap<WorkerId, WorkerMeta>,
    next_worker_id: WorkerId,
    next_job_id: JobId,
    job: Option<JobMeta>,

    map_tasks: BTreeMap<TaskId, Task>,
    reduce_tasks: BTreeMap<TaskId, Task>,
    n_map: u32,
    n_reduce: u32,
    completed_map: u32,
    completed_reduce: u32,
}

impl CoordinatorState {
    fn tasks_mut(&mut self, kind: TaskKind) -> &mut BTreeMap<TaskId, Task> {
        match kind {
            TaskKind::Map => &mut self.map_tasks,
            TaskKind::Reduce => &mut self.reduce_tasks,
        }
    }

    fn tasks(&self, kind: TaskKind) -> &BTreeMap<TaskId, Task> {
        match kind {
            TaskKind::Map => &self.map_tasks,
            TaskKind::Reduce => &self.reduce_tasks,
        }
    }

    fn job_info(&self) -> Option<JobInfo> {
        self.job.as_ref().map(|job| self.snapshot(job))
    }

    fn snapshot(&self, job: &JobMeta) -> JobInfo {
        JobInfo {
            id: job.id,
            name: job.name.clone(),
            phase: self.phase,
            n_map: self.n_map,
            n_reduce: self.n_reduce,
            completed_map: self.completed_map,
            completed_reduce: self.completed_reduce,
            submitted_at: job.submitted_at,
            finished_at: job.finished_at,
        }
    }
}

/// Coordinador map/reduce: dueño de las tareas, la fase y los contadores.
///
/// Los workers sólo reciben copias de las tareas. La cola de asignación
/// tiene su propia sincronización y nunca se espera sobre ella con el lock
/// del estado tomado.
pub struct Coordinator {
    state: Mutex<CoordinatorState>,
    queue: TaskQueue,
    done_tx: watch::Sender<bool>,
}

impl Coordinator {
    pub fn new(queue_capacity: usize) -> Self {
        let (done_tx, _) = watch::channel(false);
        Self {
            state: Mutex::new(CoordinatorState {
                phase: JobPhase::Idle,
                workers: HashMap::new(),
                next_worker_id: 0,
                next_job_id: 0,
                job: None,
                map_tasks: BTreeMap::new(),
                reduce_tasks: BTreeMap::new(),
                n_map: 0,
                n_reduce: 0,
                completed_map: 0,
                completed_reduce: 0,
            }),
            queue: TaskQueue::new(queue_capacity),
            done_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /* ---------------- job ---------------- */

    /// Crea una tarea map por entrada (ids 1..=M, en orden) y arranca la fase Map.
    pub fn submit_job(
        &self,
        name: String,
        inputs: Vec<String>,
        n_reduce: u32,
    ) -> Result<JobInfo, CoordinatorError> {
        let mut st = self.lock();

        if st.phase != JobPhase::Idle {
            return Err(CoordinatorError::JobAlreadySubmitted { phase: st.phase });
        }
        if inputs.is_empty() {
            return Err(CoordinatorError::InvalidJob("sin archivos de entrada".into()));
        }
        if n_reduce == 0 {
            return Err(CoordinatorError::InvalidJob("n_reduce debe ser > 0".into()));
        }
        let capacity = self.queue.capacity();
        if inputs.len() > capacity || n_reduce as usize > capacity {
            return Err(CoordinatorError::InvalidJob(format!(
                "{} tareas map / {} reduce superan la capacidad de la cola ({})",
                inputs.len(),
                n_reduce,
                capacity
            )));
        }

        let n_map = inputs.len() as u32;
        st.n_map = n_map;
        st.n_reduce = n_reduce;

        for (i, input) in inputs.into_iter().enumerate() {
            let task = Task::new_map(i as TaskId + 1, input, n_map, n_reduce);
            st.map_tasks.insert(task.id, task.clone());
            self.queue.push(task)?;
        }

        st.next_job_id += 1;
        st.phase = JobPhase::Map;
        let job = JobMeta {
            id: st.next_job_id,
            name,
            submitted_at: Utc::now(),
            finished_at: None,
        };
        let info = st.snapshot(&job);
        st.job = Some(job);

        info!(
            "job {} iniciado con {} tareas map y {} reduce",
            info.id, n_map, n_reduce
        );

        Ok(info)
    }

    pub fn job_info(&self) -> Option<JobInfo> {
        self.lock().job_info()
    }

    pub fn phase(&self) -> JobPhase {
        self.lock().phase
    }

    /// Copia de las tareas de un tipo, ordenadas por id.
    pub fn tasks(&self, kind: TaskKind) -> Vec<Task> {
        self.lock().tasks(kind).values().cloned().collect()
    }

    /* ---------------- operaciones remotas ---------------- */

    pub fn register_worker(&self, addr: String) -> WorkerId {
        let mut st = self.lock();
        st.next_worker_id += 1;
        let id = st.next_worker_id;
        info!("worker {} registrado desde {}", id, addr);
        st.workers.insert(
            id,
            WorkerMeta {
                addr,
                last_heartbeat: SystemTime::now(),
                tasks_completed: 0,
                last_cpu_percent: None,
                last_mem_bytes: None,
            },
        );
        id
    }

    /// Sólo registra que el worker sigue vivo; no toca la asignación de tareas.
    pub fn heartbeat(
        &self,
        worker_id: WorkerId,
        cpu_percent: Option<f32>,
        mem_bytes: Option<u64>,
    ) -> bool {
        let mut st = self.lock();
        match st.workers.get_mut(&worker_id) {
            Some(meta) => {
                meta.last_heartbeat = SystemTime::now();
                meta.last_cpu_percent = cpu_percent.or(meta.last_cpu_percent);
                meta.last_mem_bytes = mem_bytes.or(meta.last_mem_bytes);
                true
            }
            None => {
                warn!("heartbeat de worker desconocido {}", worker_id);
                false
            }
        }
    }

    /// Saca la siguiente tarea de la cola sin esperar. `None` = no hay nada ahora.
    pub fn request_task(&self, worker_id: WorkerId) -> Option<Task> {
        let popped = self.queue.try_pop()?;

        let mut st = self.lock();
        let Some(task) = st.tasks_mut(popped.kind).get_mut(&popped.id) else {
            warn!("tarea {:?} {} en cola sin registro", popped.kind, popped.id);
            return None;
        };
        task.state = TaskState::InProgress;
        task.worker_id = Some(worker_id);

        info!(
            "asignando tarea {} ({:?}) al worker {}",
            task.id, task.kind, worker_id
        );
        Some(task.clone())
    }

    /// Marca una tarea como completada. Reportes duplicados se aceptan sin
    /// efectos. Al completar todas las map crea las R reduce; al completar
    /// todas las reduce pasa a Done y dispara la señal de fin.
    pub fn report_task(
        &self,
        worker_id: WorkerId,
        task_id: TaskId,
        kind: TaskKind,
    ) -> Result<bool, CoordinatorError> {
        let mut st = self.lock();

        let task = st
            .tasks_mut(kind)
            .get_mut(&task_id)
            .ok_or(CoordinatorError::TaskNotFound { kind, task_id })?;

        if task.worker_id != Some(worker_id) {
            return Err(CoordinatorError::OwnerMismatch {
                kind,
                task_id,
                owner: task.worker_id,
                reporter: worker_id,
            });
        }

        if task.state == TaskState::Completed {
            warn!(
                "reporte duplicado de tarea {} ({:?}) del worker {}",
                task_id, kind, worker_id
            );
            return Ok(true);
        }

        task.state = TaskState::Completed;
        if let Some(meta) = st.workers.get_mut(&worker_id) {
            meta.tasks_completed += 1;
        }
        info!(
            "tarea {} ({:?}) completada por worker {}",
            task_id, kind, worker_id
        );

        match kind {
            TaskKind::Map => {
                st.completed_map += 1;
                if st.completed_map == st.n_map {
                    info!("todas las tareas map completadas, empieza la fase reduce");
                    st.phase = JobPhase::Reduce;
                    let (n_map, n_reduce) = (st.n_map, st.n_reduce);
                    for id in 0..n_reduce {
                        let task = Task::new_reduce(id, n_map, n_reduce);
                        st.reduce_tasks.insert(id, task.clone());
                        self.queue.push(task)?;
                    }
                }
            }
            TaskKind::Reduce => {
                st.completed_reduce += 1;
                if st.completed_reduce == st.n_reduce {
                    st.phase = JobPhase::Done;
                    if let Some(job) = st.job.as_mut() {
                        job.finished_at = Some(Utc::now());
                        info!("todas las tareas reduce completadas, job {} terminado", job.id);
                    }
                    self.done_tx.send_replace(true);
                }
            }
        }

        Ok(true)
    }

    /* ---------------- señal de fin ---------------- */

    pub fn is_done(&self) -> bool {
        *self.done_tx.borrow()
    }

    /// Se resuelve cuando el job termina, aunque se llame después del final.
    pub async fn wait_done(&self) {
        let mut rx = self.done_tx.subscribe();
        // el sender vive tanto como `self`, así que no puede cerrarse aquí
        let _ = rx.wait_for(|done| *done).await;
    }

    /* ---------------- métricas ---------------- */

    pub fn list_workers(&self) -> Vec<WorkerMetrics> {
        let now = SystemTime::now();
        let st = self.lock();

        let mut out: Vec<WorkerMetrics> = st
            .workers
            .iter()
            .map(|(id, meta)| WorkerMetrics {
                worker_id: *id,
                addr: meta.addr.clone(),
                last_heartbeat_secs_ago: now
                    .duration_since(meta.last_heartbeat)
                    .unwrap_or_default()
                    .as_secs(),
                tasks_completed: meta.tasks_completed,
                cpu_percent: meta.last_cpu_percent,
                mem_bytes: meta.last_mem_bytes,
            })
            .collect();
        out.sort_by_key(|w| w.worker_id);
        out
    }
}
