use crate::engine::MapReduceApp;
use crate::task::KeyValue;

/// WordCount: cada palabra (secuencia de letras) emite `(palabra, "1")`;
/// reduce devuelve cuántas veces apareció.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCount;

impl MapReduceApp for WordCount {
    fn map(&self, contents: &str) -> Vec<KeyValue> {
        contents
            .split(|c: char| !c.is_alphabetic())
            .filter(|w| !w.is_empty())
            .map(|w| KeyValue::new(w, "1"))
            .collect()
    }

    fn reduce(&self, values: &[String]) -> String {
        values.len().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_separa_por_no_letras() {
        let mut out = WordCount.map("hello world, goodbye\nworld 42x");
        out.sort_by(|a, b| a.key.cmp(&b.key));

        assert_eq!(
            out,
            vec![
                KeyValue::new("goodbye", "1"),
                KeyValue::new("hello", "1"),
                KeyValue::new("world", "1"),
                KeyValue::new("world", "1"),
                KeyValue::new("x", "1"),
            ]
        );
    }

    #[test]
    fn map_respeta_mayusculas_y_acentos() {
        let keys: Vec<String> = WordCount
            .map("Año año")
            .into_iter()
            .map(|kv| kv.key)
            .collect();
        assert_eq!(keys, vec!["Año", "año"]);
    }

    #[test]
    fn map_de_texto_vacio_no_emite_nada() {
        assert!(WordCount.map("  123 ... ").is_empty());
    }

    #[test]
    fn reduce_cuenta_valores() {
        let values = vec!["1".to_string(), "1".to_string(), "1".to_string()];
        assert_eq!(WordCount.reduce(&values), "3");
    }
}
