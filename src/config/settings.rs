// src/config/settings.rs: layered run configuration

use std::fs;
use std::path::Path;

use serde_json::{Map, Value, json};

use crate::config::defs::PipelineError;

/// Merged configuration tree. Built once at startup from an ordered list of
/// sources (built-in defaults, optional user file, CLI overrides) and treated
/// as read-only for the rest of the run.
#[derive(Debug, Clone)]
pub struct Settings {
    root: Value,
}

impl Settings {
    /// Merges an ordered sequence of JSON documents, later sources winning
    /// per key. Object values merge recursively; anything else replaces.
    pub fn from_sources<I>(sources: I) -> Settings
    where
        I: IntoIterator<Item = Value>,
    {
        let mut root = Value::Object(Map::new());
        for source in sources {
            deep_merge(&mut root, source);
        }
        Settings { root }
    }

    /// Built-in defaults. Every key a rule template consumes is declared
    /// here so a stripped user config still expands.
    pub fn defaults() -> Value {
        json!({
            "filter": { "min_scaffold_length": 500 },
            "cluster": { "submit": "srun" },
            "rules": {
                "trim":                 { "threads": 4,  "mem_mb": 4096 },
                "read-report":          { "threads": 1,  "mem_mb": 1024 },
                "assemble":             { "threads": 16, "mem_mb": 65536 },
                "filter":               { "threads": 1,  "mem_mb": 1024 },
                "per-sample-report":    { "threads": 4,  "mem_mb": 4096 },
                "combined-report":      { "threads": 4,  "mem_mb": 8192 },
                "completeness-report":  { "threads": 8,  "mem_mb": 40960 },
                "final-summary-report": { "threads": 1,  "mem_mb": 2048 },
            },
            "tools": {
                "trimmomatic": { "options": "ILLUMINACLIP:NexteraPE-PE.fa:2:30:10 SLIDINGWINDOW:4:20 MINLEN:36" },
                "spades":      { "options": "--careful" },
                "quast":       { "options": "" },
                "checkm":      { "options": "--tab_table" },
                "fastqc":      { "options": "" },
                "multiqc":     { "options": "--force" },
            },
        })
    }

    /// Reads one configuration document from disk.
    pub fn load_file(path: &Path) -> Result<Value, PipelineError> {
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            PipelineError::InvalidConfig(format!("cannot parse {}: {}", path.display(), e))
        })
    }

    /// Builds an override document from `key=value` pairs (dotted keys).
    /// Values parse as JSON scalars where possible, otherwise as strings.
    pub fn overrides_from_pairs(pairs: &[String]) -> Result<Value, PipelineError> {
        let mut root = Map::new();
        for pair in pairs {
            let (key, raw) = pair.split_once('=').ok_or_else(|| {
                PipelineError::InvalidConfig(format!("override '{}' is not key=value", pair))
            })?;
            if key.is_empty() {
                return Err(PipelineError::InvalidConfig(format!(
                    "override '{}' has an empty key",
                    pair
                )));
            }
            let value = serde_json::from_str(raw).unwrap_or(Value::String(raw.to_string()));
            let parts: Vec<&str> = key.split('.').collect();
            let mut map = &mut root;
            for part in &parts[..parts.len() - 1] {
                let child = map
                    .entry(part.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                // An earlier override may have set a scalar here; the
                // deeper key wins and the scalar becomes a subtree.
                if !child.is_object() {
                    *child = Value::Object(Map::new());
                }
                map = child.as_object_mut().ok_or_else(|| {
                    PipelineError::InvalidConfig(format!("override key '{}' cannot nest", key))
                })?;
            }
            map.insert(parts[parts.len() - 1].to_string(), value);
        }
        Ok(Value::Object(root))
    }

    fn lookup(&self, key: &str) -> Option<&Value> {
        let mut node = &self.root;
        for part in key.split('.') {
            node = node.as_object()?.get(part)?;
        }
        Some(node)
    }

    pub fn require_u64(&self, key: &str) -> Result<u64, PipelineError> {
        self.lookup(key)
            .and_then(Value::as_u64)
            .ok_or_else(|| PipelineError::ConfigKeyMissing(key.to_string()))
    }

    pub fn require_str(&self, key: &str) -> Result<&str, PipelineError> {
        self.lookup(key)
            .and_then(Value::as_str)
            .ok_or_else(|| PipelineError::ConfigKeyMissing(key.to_string()))
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.lookup(key).and_then(Value::as_str)
    }
}

fn deep_merge(base: &mut Value, over: Value) {
    match (base, over) {
        (Value::Object(base_map), Value::Object(over_map)) => {
            for (key, over_value) in over_map {
                match base_map.get_mut(&key) {
                    Some(base_value) => deep_merge(base_value, over_value),
                    None => {
                        base_map.insert(key, over_value);
                    }
                }
            }
        }
        (base_slot, over_value) => *base_slot = over_value,
    }
}
