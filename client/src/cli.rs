use anyhow::Result;
use clap::{Parser, Subcommand};
use common::{JobId, JobInfo, JobRequest, JobResults, WorkerMetrics};
use reqwest::{Client, Response};
use serde::Deserialize;
use std::env;

/// - En Docker: MASTER_URL=http://master:8080
/// - Local: default http://localhost:8080
fn master_base_url() -> String {
    env::var("MASTER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "CLI simple para hablar con el master map/reduce")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Envía un job: una tarea map por archivo de entrada
    Submit {
        #[arg(value_name = "NOMBRE")]
        name: String,

        /// Patrón de archivos de entrada (visto desde el master)
        #[arg(long, default_value = "/data/input/*")]
        input_glob: String,

        /// Número de tareas reduce
        #[arg(long, default_value_t = 2)]
        n_reduce: u32,
    },
    /// Consulta el estado de un job
    Status {
        #[arg(value_name = "JOB_ID")]
        id: JobId,
    },
    /// Lista los archivos de salida de un job
    Results {
        #[arg(value_name = "JOB_ID")]
        id: JobId,
    },
    /// Lista los workers registrados
    Workers,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Imprime el error que devolvió el master (cuerpo {"error": ...}).
async fn print_error(what: &str, resp: Response) {
    let status = resp.status();
    match resp.json::<ErrorBody>().await {
        Ok(body) => println!("Error {} (status {}): {}", what, status, body.error),
        Err(_) => println!("Error {} (status {})", what, status),
    }
}

fn print_job(job: &JobInfo) {
    println!("  id: {}", job.id);
    println!("  nombre: {}", job.name);
    println!("  fase: {:?}", job.phase);
    println!(
        "  map: {}/{} completadas",
        job.completed_map, job.n_map
    );
    println!(
        "  reduce: {}/{} completadas",
        job.completed_reduce, job.n_reduce
    );
    println!("  submitted_at: {}", job.submitted_at);
    if let Some(ref done) = job.finished_at {
        println!("  finalizado: {}", done);
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = master_base_url();

    match cli.command {
        Commands::Submit {
            name,
            input_glob,
            n_reduce,
        } => {
            let url = format!("{}/api/v1/jobs", base_url);
            let req = JobRequest {
                name,
                input_glob,
                n_reduce,
            };

            let resp = client.post(&url).json(&req).send().await?;
            if resp.status().is_success() {
                let job: JobInfo = resp.json().await?;
                println!("Job creado:");
                print_job(&job);
            } else {
                print_error("enviando el job", resp).await;
            }
        }

        Commands::Status { id } => {
            let url = format!("{}/api/v1/jobs/{}", base_url, id);
            let resp = client.get(&url).send().await?;
            if resp.status().is_success() {
                let job: JobInfo = resp.json().await?;
                println!("Job:");
                print_job(&job);
            } else {
                print_error("consultando el job", resp).await;
            }
        }

        Commands::Results { id } => {
            let url = format!("{}/api/v1/jobs/{id}/results", base_url);
            let resp = client.get(&url).send().await?;

            if resp.status().is_success() {
                let results: JobResults = resp.json().await?;
                println!("Resultados para job {}:", results.job_id);
                println!("  directorio de salida: {}", results.output_dir);
                if results.files.is_empty() {
                    println!("  (sin archivos de salida)");
                } else {
                    println!("  archivos:");
                    for f in results.files {
                        println!("    - {}", f);
                    }
                }
            } else {
                print_error("consultando resultados", resp).await;
            }
        }

        Commands::Workers => {
            let url = format!("{}/api/v1/workers", base_url);
            let resp = client.get(&url).send().await?;
            if resp.status().is_success() {
                let workers: Vec<WorkerMetrics> = resp.json().await?;
                if workers.is_empty() {
                    println!("No hay workers registrados.");
                }
                for w in workers {
                    println!("Worker {}", w.worker_id);
                    println!("  addr           : {}", w.addr);
                    println!("  last_heartbeat : {} s ago", w.last_heartbeat_secs_ago);
                    println!("  tareas ok      : {}", w.tasks_completed);
                    match w.cpu_percent {
                        Some(cpu) => println!("  cpu_percent    : {:.1}%", cpu),
                        None => println!("  cpu_percent    : (sin datos)"),
                    }
                    match w.mem_bytes {
                        Some(mem) => println!("  mem_bytes      : {}", mem),
                        None => println!("  mem_bytes      : (sin datos)"),
                    }
                    println!();
                }
            } else {
                print_error("consultando /api/v1/workers", resp).await;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_usa_defaults() {
        let cli = Cli::try_parse_from(["client", "submit", "wc"]).unwrap();
        match cli.command {
            Commands::Submit {
                name,
                input_glob,
                n_reduce,
            } => {
                assert_eq!(name, "wc");
                assert_eq!(input_glob, "/data/input/*");
                assert_eq!(n_reduce, 2);
            }
            _ => panic!("se esperaba submit"),
        }
    }

    #[test]
    fn submit_acepta_glob_y_n_reduce() {
        let cli = Cli::try_parse_from([
            "client",
            "submit",
            "wc",
            "--input-glob",
            "/tmp/in/*.txt",
            "--n-reduce",
            "5",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Submit { n_reduce: 5, ref input_glob, .. } if input_glob == "/tmp/in/*.txt"
        ));
    }

    #[test]
    fn status_requiere_id_numerico() {
        assert!(Cli::try_parse_from(["client", "status", "abc"]).is_err());
        assert!(matches!(
            Cli::try_parse_from(["client", "status", "1"]).unwrap().command,
            Commands::Status { id: 1 }
        ));
    }
}
