mod handlers;
mod state;

use std::{fs, path::Path, sync::Arc};

use anyhow::{Context, Result};
use common::{Coordinator, DEFAULT_QUEUE_CAPACITY};
use glob::glob;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::state::{AppState, MasterConfig};

/// Crea el directorio de salida y borra los mr-out-* de corridas anteriores.
fn prepare_output_dir(output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("no se pudo crear {}", output_dir.display()))?;

    let pattern = output_dir.join("mr-out-*");
    for old in glob(&pattern.to_string_lossy())?.flatten() {
        if let Err(e) = fs::remove_file(&old) {
            warn!("no se pudo borrar {}: {}", old.display(), e);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("master=debug,common=debug,tower_http=info")),
        )
        .init();

    let config = MasterConfig::from_env();
    prepare_output_dir(&config.output_dir)?;

    let coordinator = Arc::new(Coordinator::new(DEFAULT_QUEUE_CAPACITY));

    // job inicial opcional, igual que enviarlo con el cliente
    if let Some(pattern) = &config.input_glob {
        let inputs = handlers::resolve_inputs(pattern)
            .with_context(|| format!("patrón MASTER_INPUT_GLOB inválido: {pattern}"))?;
        coordinator.submit_job("startup".to_string(), inputs, config.n_reduce)?;
    }

    let app = handlers::build_router(AppState::new(
        coordinator.clone(),
        config.output_dir.clone(),
    ));

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("no se pudo escuchar en {}", config.bind))?;
    info!("master escuchando en {}", listener.local_addr()?);

    let done = coordinator.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = done.wait_done() => info!("job terminado, apagando master"),
                _ = tokio::signal::ctrl_c() => warn!("ctrl-c recibido, apagando master"),
            }
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn prepare_output_dir_borra_salidas_viejas() {
        let dir = env::temp_dir().join("master_main_tests").join("prepare");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("mr-out-0"), "viejo").unwrap();
        fs::write(dir.join("notas.txt"), "queda").unwrap();

        prepare_output_dir(&dir).unwrap();

        assert!(!dir.join("mr-out-0").exists());
        assert!(dir.join("notas.txt").exists());
    }
}
