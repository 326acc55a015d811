use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::types::DbResult;

const CONFIG_FILE: &str = "tablekit.toml";
const ENV_PREFIX: &str = "TABLEKIT";

fn default_query_limit() -> u32 { 100 }
fn default_query_limit_table() -> u32 { 10_000 }
fn default_hide_column() -> String { "zk_deleted".to_string() }
fn default_version_lock_table() -> String { "model_version_locks".to_string() }
fn default_version_lock_ttl_hours() -> u32 { 24 }
fn default_suffix() -> String { "_texts".to_string() }
fn default_parent_field() -> String { "parent".to_string() }
fn default_lang_field() -> String { "lang".to_string() }

/// How a table's translatable fields are stored.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MultilangTable {
    pub fields: Vec<String>,
    /// Text table name is the main table name plus this suffix.
    #[serde(default = "default_suffix")]
    pub suffix: String,
    #[serde(default = "default_parent_field")]
    pub parent_field: String,
    #[serde(default = "default_lang_field")]
    pub lang_field: String,
}

impl MultilangTable {
    pub fn new<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            suffix: default_suffix(),
            parent_field: default_parent_field(),
            lang_field: default_lang_field(),
        }
    }
}

/// Engine settings. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Executions allowed per distinct statement text; 0 disables the check.
    #[serde(default = "default_query_limit")]
    pub query_limit: u32,
    /// Executions allowed per table; 0 disables the check.
    #[serde(default = "default_query_limit_table")]
    pub query_limit_table: u32,
    /// Tables served from the in-memory row cache.
    #[serde(default)]
    pub cached_tables: Vec<String>,
    /// Tables whose deletes only set the hide flag.
    #[serde(default)]
    pub auto_hide: Vec<String>,
    #[serde(default = "default_hide_column")]
    pub hide_column: String,
    /// Main table -> extension table sharing its primary key.
    #[serde(default)]
    pub linked_tables: HashMap<String, String>,
    #[serde(default)]
    pub multilang: HashMap<String, MultilangTable>,
    #[serde(default = "default_version_lock_table")]
    pub version_lock_table: String,
    #[serde(default = "default_version_lock_ttl_hours")]
    pub version_lock_ttl_hours: u32,
    /// Log every statement at info level.
    #[serde(default)]
    pub debug: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            query_limit: default_query_limit(),
            query_limit_table: default_query_limit_table(),
            cached_tables: Vec::new(),
            auto_hide: Vec::new(),
            hide_column: default_hide_column(),
            linked_tables: HashMap::new(),
            multilang: HashMap::new(),
            version_lock_table: default_version_lock_table(),
            version_lock_ttl_hours: default_version_lock_ttl_hours(),
            debug: false,
        }
    }
}

/// Which execution counter a limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    /// Per distinct statement text.
    Query,
    /// Per table.
    Table,
}

impl EngineConfig {
    /// Load configuration with priority: ENV > config file > defaults.
    /// The file is `path` when given, else `./tablekit.toml`, else
    /// `tablekit/tablekit.toml` under the user's config directory.
    pub fn load(path: Option<&Path>) -> DbResult<Self> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path).required(true));
            }
            None => {
                if let Some(found) = Self::default_paths().into_iter().find(|p| p.exists()) {
                    tracing::debug!(path = %found.display(), "loading engine config");
                    builder = builder.add_source(File::from(found));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("tablekit").join(CONFIG_FILE));
        }
        paths
    }

    #[must_use]
    pub fn is_cached(&self, table: &str) -> bool {
        self.cached_tables.iter().any(|t| t == table)
    }

    #[must_use]
    pub fn is_auto_hide(&self, table: &str) -> bool {
        self.auto_hide.iter().any(|t| t == table)
    }

    /// Text table name of a multilang table.
    #[must_use]
    pub fn text_table(&self, table: &str) -> Option<String> {
        self.multilang.get(table).map(|ml| format!("{table}{}", ml.suffix))
    }

    pub fn set_limit(&mut self, kind: LimitKind, n: u32) {
        match kind {
            LimitKind::Query => self.query_limit = n,
            LimitKind::Table => self.query_limit_table = n,
        }
    }
}
