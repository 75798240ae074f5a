use serde::{Deserialize, Serialize};

use crate::worker::WorkerId;

/// Id de tarea. En map es 1..=M, en reduce coincide con la partición 0..R-1.
pub type TaskId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    Map,
    Reduce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Idle,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub state: TaskState,

    /// Worker dueño de la tarea; se fija al asignarla
    pub worker_id: Option<WorkerId>,

    /// M y R del job, iguales en todas las tareas
    pub n_map: u32,
    pub n_reduce: u32,

    /// Archivo de entrada (sólo tareas map)
    pub input_path: Option<String>,
}

impl Task {
    pub fn new_map(id: TaskId, input_path: String, n_map: u32, n_reduce: u32) -> Self {
        Self {
            id,
            kind: TaskKind::Map,
            state: TaskState::Idle,
            worker_id: None,
            n_map,
            n_reduce,
            input_path: Some(input_path),
        }
    }

    pub fn new_reduce(id: TaskId, n_map: u32, n_reduce: u32) -> Self {
        Self {
            id,
            kind: TaskKind::Reduce,
            state: TaskState::Idle,
            worker_id: None,
            n_map,
            n_reduce,
            input_path: None,
        }
    }
}

/// Par clave/valor que viaja entre map y reduce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}
