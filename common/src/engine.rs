use std::{
    fs::{self, File},
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::task::{KeyValue, Task, TaskId, TaskKind};

/// Funciones de usuario que se inyectan al worker.
///
/// `map` transforma el contenido completo de un archivo en pares clave/valor;
/// `reduce` agrega todos los valores de una misma clave.
pub trait MapReduceApp: Send + Sync {
    fn map(&self, contents: &str) -> Vec<KeyValue>;
    fn reduce(&self, values: &[String]) -> String;
}

/// Directorios de trabajo compartidos entre workers.
#[derive(Debug, Clone)]
pub struct WorkDirs {
    /// Particiones intermedias mr-intermediate-<map>-<reduce>
    pub tmp_dir: PathBuf,
    /// Salidas finales mr-out-<reduce>
    pub output_dir: PathBuf,
}

/// Partición intermedia escrita por una tarea map.
#[derive(Debug, Clone)]
pub struct Partition {
    pub map_id: TaskId,
    pub reduce_id: u32,
    pub path: PathBuf,
}

/* =========================
   Hash y nombres de archivos
   ========================= */

const FNV32_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;

/// FNV-1a de 32 bits con el bit de signo apagado.
/// Tiene que dar lo mismo en cualquier proceso: map y reduce no se comunican
/// la partición, la deducen de aquí.
pub fn ihash(key: &str) -> u32 {
    let mut h = FNV32_OFFSET_BASIS;
    for b in key.as_bytes() {
        h ^= u32::from(*b);
        h = h.wrapping_mul(FNV32_PRIME);
    }
    h & 0x7fff_ffff
}

pub fn partition_for(key: &str, n_reduce: u32) -> u32 {
    ihash(key) % n_reduce
}

pub fn intermediate_path(tmp_dir: &Path, map_id: TaskId, reduce_id: u32) -> PathBuf {
    tmp_dir.join(format!("mr-intermediate-{}-{}", map_id, reduce_id))
}

pub fn output_path(output_dir: &Path, reduce_id: u32) -> PathBuf {
    output_dir.join(format!("mr-out-{}", reduce_id))
}

/* =========================
   Shuffle a particiones en disco
   ========================= */

/// Reparte los registros en `n_reduce` archivos JSONL según `ihash(key) % n_reduce`,
/// respetando el orden de emisión dentro de cada partición.
/// Se crean todas las particiones, aunque queden vacías.
pub fn write_partitions(
    records: Vec<KeyValue>,
    map_id: TaskId,
    n_reduce: u32,
    tmp_dir: &Path,
) -> io::Result<Vec<Partition>> {
    if n_reduce == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "n_reduce debe ser > 0",
        ));
    }
    fs::create_dir_all(tmp_dir)?;

    let mut writers: Vec<BufWriter<File>> = Vec::with_capacity(n_reduce as usize);
    let mut parts: Vec<Partition> = Vec::with_capacity(n_reduce as usize);

    for reduce_id in 0..n_reduce {
        let path = intermediate_path(tmp_dir, map_id, reduce_id);
        writers.push(BufWriter::new(File::create(&path)?));
        parts.push(Partition {
            map_id,
            reduce_id,
            path,
        });
    }

    for kv in &records {
        let pid = partition_for(&kv.key, n_reduce) as usize;
        serde_json::to_writer(&mut writers[pid], kv)?;
        writers[pid].write_all(b"\n")?;
    }

    for w in writers.iter_mut() {
        w.flush()?;
    }

    Ok(parts)
}

/// Lee una partición intermedia. Si el archivo no existe devuelve vacío:
/// significa que esa tarea map no emitió nada para esta partición.
pub fn read_partition(path: &Path) -> io::Result<Vec<KeyValue>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("partición {} no existe, se toma como vacía", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let mut out = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let kv: KeyValue = serde_json::from_str(&line).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("registro corrupto en {}: {e}", path.display()),
            )
        })?;
        out.push(kv);
    }

    Ok(out)
}

/* =========================
   Sort + group + reduce
   ========================= */

/// Ordena por clave (bytes, orden total) y llama a `reduce` una vez por
/// cada tramo de claves iguales. El resultado sale ordenado por clave.
pub fn group_and_reduce<A>(mut records: Vec<KeyValue>, app: &A) -> Vec<(String, String)>
where
    A: MapReduceApp + ?Sized,
{
    // sort estable: claves iguales quedan contiguas
    records.sort_by(|a, b| a.key.as_bytes().cmp(b.key.as_bytes()));

    let mut out = Vec::new();
    let mut i = 0;
    while i < records.len() {
        let mut j = i + 1;
        while j < records.len() && records[j].key == records[i].key {
            j += 1;
        }
        let values: Vec<String> = records[i..j].iter().map(|kv| kv.value.clone()).collect();
        out.push((records[i].key.clone(), app.reduce(&values)));
        i = j;
    }
    out
}

/* =========================
   Ejecución de tareas
   ========================= */

fn expect_kind(task: &Task, kind: TaskKind) -> io::Result<()> {
    if task.kind != kind {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("tarea {} es {:?}, se esperaba {:?}", task.id, task.kind, kind),
        ));
    }
    Ok(())
}

/// Tarea map: lee la entrada completa, aplica `map` y escribe las R particiones.
pub fn run_map_task<A>(app: &A, task: &Task, dirs: &WorkDirs) -> io::Result<Vec<Partition>>
where
    A: MapReduceApp + ?Sized,
{
    expect_kind(task, TaskKind::Map)?;
    let input_path = task.input_path.as_deref().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("tarea map {} sin archivo de entrada", task.id),
        )
    })?;

    let contents = fs::read_to_string(input_path)?;
    let records = app.map(&contents);
    debug!(
        "map {}: {} registros desde {}",
        task.id,
        records.len(),
        input_path
    );

    write_partitions(records, task.id, task.n_reduce, &dirs.tmp_dir)
}

/// Tarea reduce: junta la partición `task.id` de las M tareas map (ids 1..=M),
/// agrupa, reduce y escribe `clave valor` por línea en mr-out-<id>.
pub fn run_reduce_task<A>(app: &A, task: &Task, dirs: &WorkDirs) -> io::Result<PathBuf>
where
    A: MapReduceApp + ?Sized,
{
    expect_kind(task, TaskKind::Reduce)?;

    let mut records = Vec::new();
    for map_id in 1..=task.n_map {
        let path = intermediate_path(&dirs.tmp_dir, map_id, task.id);
        records.extend(read_partition(&path)?);
    }
    debug!("reduce {}: {} registros", task.id, records.len());

    let groups = group_and_reduce(records, app);

    fs::create_dir_all(&dirs.output_dir)?;
    let out_path = output_path(&dirs.output_dir, task.id);
    let mut writer = BufWriter::new(File::create(&out_path)?);
    for (key, value) in groups {
        writeln!(writer, "{} {}", key, value)?;
    }
    writer.flush()?;

    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs, io::Write};

    fn temp_dir(sub: &str) -> PathBuf {
        let base = env::temp_dir().join("engine_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    fn dirs(base: &Path) -> WorkDirs {
        WorkDirs {
            tmp_dir: base.join("tmp"),
            output_dir: base.join("out"),
        }
    }

    /// map: una palabra por campo separado por espacios; reduce: cantidad.
    struct Count;

    impl MapReduceApp for Count {
        fn map(&self, contents: &str) -> Vec<KeyValue> {
            contents
                .split_whitespace()
                .map(|w| KeyValue::new(w, "1"))
                .collect()
        }

        fn reduce(&self, values: &[String]) -> String {
            values.len().to_string()
        }
    }

    /* =========================
       HASH
       ========================= */

    #[test]
    fn ihash_coincide_con_vectores_fnv1a() {
        // valores conocidos de FNV-1a 32 (con el bit alto apagado)
        assert_eq!(ihash(""), 0x811c_9dc5 & 0x7fff_ffff);
        assert_eq!(ihash("a"), 0xe40c_292c & 0x7fff_ffff);
        assert_eq!(ihash("foobar"), 0xbf9c_f968 & 0x7fff_ffff);
    }

    #[test]
    fn partition_for_es_determinista_y_en_rango() {
        for key in ["the", "cat", "sat", "ran", "xyz", ""] {
            let p = partition_for(key, 7);
            assert!(p < 7);
            assert_eq!(p, partition_for(key, 7));
        }
    }

    #[test]
    fn nombres_de_archivo_usan_ambos_ids() {
        let base = Path::new("/data/tmp");
        assert_eq!(
            intermediate_path(base, 3, 1),
            PathBuf::from("/data/tmp/mr-intermediate-3-1")
        );
        assert_eq!(
            output_path(Path::new("/data/output"), 2),
            PathBuf::from("/data/output/mr-out-2")
        );
    }

    /* =========================
       PARTICIONES
       ========================= */

    #[test]
    fn write_partitions_crea_r_archivos_y_respeta_el_hash() {
        let tmp = temp_dir("write_parts");
        let records = vec![
            KeyValue::new("a", "1"),
            KeyValue::new("b", "1"),
            KeyValue::new("a", "2"),
            KeyValue::new("zeta", "1"),
        ];

        let parts = write_partitions(records, 5, 3, &tmp).unwrap();
        assert_eq!(parts.len(), 3);

        let mut total = 0;
        for part in &parts {
            assert!(part.path.exists());
            assert_eq!(part.map_id, 5);
            let recs = read_partition(&part.path).unwrap();
            for kv in &recs {
                assert_eq!(partition_for(&kv.key, 3), part.reduce_id);
            }
            total += recs.len();
        }
        assert_eq!(total, 4);

        // orden de emisión dentro de la partición
        let pa = &parts[partition_for("a", 3) as usize];
        let vals: Vec<String> = read_partition(&pa.path)
            .unwrap()
            .into_iter()
            .filter(|kv| kv.key == "a")
            .map(|kv| kv.value)
            .collect();
        assert_eq!(vals, vec!["1", "2"]);
    }

    #[test]
    fn read_partition_inexistente_es_vacia() {
        let tmp = temp_dir("missing_part");
        let recs = read_partition(&tmp.join("mr-intermediate-9-9")).unwrap();
        assert!(recs.is_empty());
    }

    #[test]
    fn read_partition_corrupta_es_error() {
        let tmp = temp_dir("corrupt_part");
        let path = tmp.join("mr-intermediate-1-0");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "{}", r#"{"key":"a","value":"1"}"#).unwrap();
        writeln!(f, "esto no es json").unwrap();

        let err = read_partition(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    /* =========================
       GROUP / REDUCE
       ========================= */

    #[test]
    fn group_and_reduce_agrupa_claves_no_contiguas() {
        let records = vec![
            KeyValue::new("a", "1"),
            KeyValue::new("b", "1"),
            KeyValue::new("a", "1"),
        ];

        let out = group_and_reduce(records, &Count);
        assert_eq!(
            out,
            vec![
                ("a".to_string(), "2".to_string()),
                ("b".to_string(), "1".to_string())
            ]
        );
    }

    #[test]
    fn group_and_reduce_ordena_por_bytes() {
        let records = vec![
            KeyValue::new("b", "1"),
            KeyValue::new("B", "1"),
            KeyValue::new("á", "1"),
            KeyValue::new("a", "1"),
        ];

        let keys: Vec<String> = group_and_reduce(records, &Count)
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["B", "a", "b", "á"]);
    }

    #[test]
    fn group_and_reduce_vacio() {
        assert!(group_and_reduce(Vec::new(), &Count).is_empty());
    }

    /* =========================
       TAREAS
       ========================= */

    #[test]
    fn run_map_task_falla_si_no_existe_la_entrada() {
        let tmp = temp_dir("map_missing");
        let task = Task::new_map(1, tmp.join("nada.txt").to_string_lossy().to_string(), 1, 2);

        let err = run_map_task(&Count, &task, &dirs(&tmp)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn run_reduce_task_rechaza_tarea_map() {
        let tmp = temp_dir("wrong_kind");
        let task = Task::new_map(1, "x".into(), 1, 1);
        assert!(run_reduce_task(&Count, &task, &dirs(&tmp)).is_err());
    }

    #[test]
    fn map_y_reduce_de_dos_entradas() {
        let tmp = temp_dir("map_reduce");
        let d = dirs(&tmp);

        // dos tareas map: "a b" y "b"; R = 1
        let in1 = tmp.join("in1.txt");
        let in2 = tmp.join("in2.txt");
        fs::write(&in1, "a b").unwrap();
        fs::write(&in2, "b").unwrap();

        for (id, path) in [(1, &in1), (2, &in2)] {
            let t = Task::new_map(id, path.to_string_lossy().to_string(), 2, 1);
            run_map_task(&Count, &t, &d).unwrap();
        }

        let out = run_reduce_task(&Count, &Task::new_reduce(0, 2, 1), &d).unwrap();
        assert_eq!(out, output_path(&d.output_dir, 0));
        assert_eq!(fs::read_to_string(&out).unwrap(), "a 1\nb 2\n");
    }

    #[test]
    fn run_reduce_task_tolera_particiones_faltantes() {
        let tmp = temp_dir("reduce_gaps");
        let d = dirs(&tmp);
        fs::create_dir_all(&d.tmp_dir).unwrap();

        // sólo existe la partición de la map 2; la 1 y la 3 no emitieron nada
        let path = intermediate_path(&d.tmp_dir, 2, 0);
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "{}", r#"{"key":"x","value":"1"}"#).unwrap();
        writeln!(f, "{}", r#"{"key":"x","value":"1"}"#).unwrap();

        let out = run_reduce_task(&Count, &Task::new_reduce(0, 3, 1), &d).unwrap();
        assert_eq!(fs::read_to_string(out).unwrap(), "x 2\n");
    }
}
