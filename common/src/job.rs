use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type JobId = u32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub name: String,

    /// Patrón de archivos de entrada, ej: "/data/input/*.txt".
    /// Cada archivo es una tarea map.
    pub input_glob: String,

    /// Número de tareas reduce (R)
    pub n_reduce: u32,
}

/// Fase global del coordinador. Sólo avanza, nunca vuelve atrás.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPhase {
    Idle,
    Map,
    Reduce,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: JobId,
    pub name: String,
    pub phase: JobPhase,

    pub n_map: u32,
    pub n_reduce: u32,
    pub completed_map: u32,
    pub completed_reduce: u32,

    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}
