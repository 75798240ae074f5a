// master/src/state.rs

use std::{env, path::PathBuf, sync::Arc};

use common::Coordinator;

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_OUTPUT_DIR: &str = "/data/output";
const DEFAULT_N_REDUCE: u32 = 2;

/// Configuración del master, leída de variables de entorno al arrancar.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    pub bind: String,
    /// Donde los workers dejan los mr-out-*
    pub output_dir: PathBuf,
    /// Si viene, se envía un job al arrancar con estos archivos
    pub input_glob: Option<String>,
    pub n_reduce: u32,
}

impl MasterConfig {
    pub fn from_env() -> Self {
        Self {
            bind: env::var("MASTER_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string()),
            output_dir: env::var("MASTER_OUTPUT_DIR")
                .unwrap_or_else(|_| DEFAULT_OUTPUT_DIR.to_string())
                .into(),
            input_glob: env::var("MASTER_INPUT_GLOB").ok().filter(|s| !s.is_empty()),
            n_reduce: env::var("MASTER_N_REDUCE")
                .ok()
                .and_then(|s| s.parse::<u32>().ok())
                .unwrap_or(DEFAULT_N_REDUCE),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub output_dir: PathBuf,
}

impl AppState {
    pub fn new(coordinator: Arc<Coordinator>, output_dir: PathBuf) -> Self {
        Self {
            coordinator,
            output_dir,
        }
    }
}
