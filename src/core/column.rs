use serde::{Deserialize, Serialize};
use super::data_type::DataType;
use super::constraints::ForeignKey;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    /// False when the column lives in a linked table but is exposed here.
    #[serde(default = "default_real")]
    pub real: bool,
    /// Store-computed column; never written.
    #[serde(default)]
    pub generated: bool,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
}

const fn default_real() -> bool {
    true
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: false,
            primary_key: false,
            real: true,
            generated: false,
            foreign_keys: Vec::new(),
        }
    }

    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    #[must_use]
    pub const fn primary(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Marks the column as materialized in the linked extension table.
    #[must_use]
    pub const fn linked(mut self) -> Self {
        self.real = false;
        self
    }

    #[must_use]
    pub const fn generated(mut self) -> Self {
        self.generated = true;
        self
    }

    #[must_use]
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_keys.push(ForeignKey::new(table, column));
        self
    }
}
