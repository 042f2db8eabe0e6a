//! Per-index schema: load/save/delete/rename against `<root>/<index>/schema.json`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::field::{Field, FieldType, NativeValue, Tokenizer};

const DEFAULT_SHARDS: u16 = 8;
const SCHEMA_FILE_NAME: &str = "schema.json";

/// On-the-wire schema shape, as stored in `schema.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConf {
    #[serde(default)]
    pub shards: u16,
    pub fields: Vec<Field>,
}

/// A fully validated, resolved schema. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Schema {
    pub name: String,
    pub store_path: PathBuf,
    pub shards: u16,
    pub fields: Vec<Field>,
    pub resolved_types: Vec<FieldType>,
    pub resolved_tokenizers: Vec<Tokenizer>,
    pub field_map: HashMap<String, usize>,
    pub pk_idx: Vec<usize>,
    /// `(field index, ascending)` pairs taken from fields with a non-`none` `sorting`.
    pub def_sort_bys: Vec<(usize, bool)>,
    pub time_idx: HashMap<String, usize>,
    pub need_zh_seg: bool,
}

impl Schema {
    /// Validate a raw `SchemaConf`, applying the defaulting rules in the spec:
    /// zero shards → 8, unknown types/tokenizers rejected, datetime fields get
    /// their type's default format when absent, at least one PK field required.
    pub fn from_conf(name: impl Into<String>, store_path: PathBuf, conf: SchemaConf) -> CoreResult<Self> {
        let name = name.into();
        if conf.fields.is_empty() {
            return Err(CoreError::invalid_schema("schema has no fields"));
        }

        let mut field_map = HashMap::with_capacity(conf.fields.len());
        let mut resolved_types = Vec::with_capacity(conf.fields.len());
        let mut resolved_tokenizers = Vec::with_capacity(conf.fields.len());
        let mut pk_idx = Vec::new();
        let mut def_sort_bys = Vec::new();
        let mut time_idx = HashMap::new();
        let mut need_zh_seg = false;

        for (idx, field) in conf.fields.iter().enumerate() {
            if field.name.trim().is_empty() {
                return Err(CoreError::invalid_schema("field name must not be empty"));
            }
            if field_map.insert(field.name.clone(), idx).is_some() {
                return Err(CoreError::invalid_schema(format!(
                    "duplicate field name: {}",
                    field.name
                )));
            }

            let (ty, tok) = field.resolve()?;
            if field.pk {
                pk_idx.push(idx);
            }
            if ty.is_datetime_family() {
                time_idx.insert(field.name.clone(), idx);
            }
            if tok == Tokenizer::Zh {
                need_zh_seg = true;
            }
            if field.sorting != crate::field::Sorting::None {
                def_sort_bys.push((idx, field.sorting.is_ascending()));
            }

            resolved_types.push(ty);
            resolved_tokenizers.push(tok);
        }

        if pk_idx.is_empty() {
            return Err(CoreError::invalid_schema("schema requires at least one pk field"));
        }

        let shards = if conf.shards == 0 { DEFAULT_SHARDS } else { conf.shards };

        Ok(Self {
            name,
            store_path,
            shards,
            fields: conf.fields,
            resolved_types,
            resolved_tokenizers,
            field_map,
            pk_idx,
            def_sort_bys,
            time_idx,
            need_zh_seg,
        })
    }

    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_map.get(name).copied()
    }

    #[must_use]
    pub fn field_type(&self, idx: usize) -> FieldType {
        self.resolved_types[idx]
    }

    #[must_use]
    pub fn tokenizer(&self, idx: usize) -> Tokenizer {
        self.resolved_tokenizers[idx]
    }

    /// The normalized, defaulted conf this schema would round-trip to when saved.
    #[must_use]
    pub fn to_conf(&self) -> SchemaConf {
        SchemaConf {
            shards: self.shards,
            fields: self
                .fields
                .iter()
                .enumerate()
                .map(|(idx, f)| {
                    let mut f = f.clone();
                    f.time_fmt = f.effective_time_fmt(self.resolved_types[idx]);
                    f
                })
                .collect(),
        }
    }

    fn index_dir(root: &Path, index: &str) -> PathBuf {
        root.join(index)
    }

    fn schema_path(root: &Path, index: &str) -> PathBuf {
        Self::index_dir(root, index).join(SCHEMA_FILE_NAME)
    }

    /// Read and validate `<root>/<index>/schema.json`.
    pub fn load(root: &Path, index: &str) -> CoreResult<Self> {
        let path = Self::schema_path(root, index);
        let bytes = std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::not_found(index)
            } else {
                CoreError::Io(e)
            }
        })?;
        let conf: SchemaConf = serde_json::from_slice(&bytes)?;
        Self::from_conf(index, Self::index_dir(root, index), conf)
    }

    /// Validate and persist a schema, creating `<root>/<index>/` if absent.
    ///
    /// Fails with `AlreadyExists` if the schema file is already present; callers
    /// that want upsert semantics should `delete` first.
    pub fn save(root: &Path, index: &str, conf: SchemaConf) -> CoreResult<Self> {
        let path = Self::schema_path(root, index);
        if path.exists() {
            return Err(CoreError::already_exists(index));
        }
        let schema = Self::from_conf(index, Self::index_dir(root, index), conf)?;
        std::fs::create_dir_all(&schema.store_path)?;
        let pretty = serde_json::to_vec_pretty(&schema.to_conf())?;
        std::fs::write(&path, pretty)?;
        tracing::info!(index, "schema created");
        Ok(schema)
    }

    /// Recursively remove `<root>/<index>`. Idempotent if already absent.
    pub fn delete(root: &Path, index: &str) -> CoreResult<()> {
        let dir = Self::index_dir(root, index);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::info!(index, "schema deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::Io(e)),
        }
    }

    /// Rename `<root>/<old>` to `<root>/<new>` via a single filesystem rename.
    pub fn rename(root: &Path, old: &str, new: &str) -> CoreResult<()> {
        let old_dir = Self::index_dir(root, old);
        let new_dir = Self::index_dir(root, new);
        if !old_dir.exists() {
            return Err(CoreError::not_found(old));
        }
        if new_dir.exists() {
            return Err(CoreError::already_exists(new));
        }
        std::fs::rename(&old_dir, &new_dir)?;
        tracing::info!(old, new, "schema renamed");
        Ok(())
    }

    /// Convert a raw JSON value for `field_name` to its native type.
    pub fn to_native_value(
        &self,
        field_name: &str,
        value: &serde_json::Value,
        tz_offset_secs: i32,
    ) -> CoreResult<NativeValue> {
        let idx = self
            .field_index(field_name)
            .ok_or_else(|| CoreError::BadRequest(format!("unknown field: {field_name}")))?;
        self.fields[idx].to_native_value(self.resolved_types[idx], value, tz_offset_secs)
    }

    /// Format a stored nanosecond timestamp for `field_name` back to a string.
    pub fn format_datetime(&self, field_name: &str, ns: i64, tz_offset_secs: i32) -> CoreResult<String> {
        let idx = self
            .field_index(field_name)
            .ok_or_else(|| CoreError::BadRequest(format!("unknown field: {field_name}")))?;
        self.fields[idx]
            .format_datetime(self.resolved_types[idx], ns, tz_offset_secs)
            .map_err(Into::into)
    }
}
