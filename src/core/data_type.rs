use serde::{Deserialize, Serialize};

/// Column type as reported by the store catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    // Integer family
    TinyInt,
    SmallInt,
    MediumInt,
    Int,
    BigInt,
    Year,
    // Float family
    Float,
    Double,
    Decimal,
    // String types
    Char { length: usize },
    Varchar { length: usize },
    Text,
    // Date/Time types
    Date,
    DateTime,
    Enum { values: Vec<String> },
    // Geometry
    Point,
    Other(String),
}

impl DataType {
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::TinyInt | Self::SmallInt | Self::MediumInt | Self::Int | Self::BigInt | Self::Year
        )
    }

    #[must_use]
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float | Self::Double | Self::Decimal)
    }

    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    #[must_use]
    pub const fn max_length(&self) -> Option<usize> {
        match self {
            Self::Char { length } | Self::Varchar { length } => Some(*length),
            _ => None,
        }
    }

    /// Maps a catalog type name (`varchar`, `int`, ...) to a type.
    #[must_use]
    pub fn from_sql_name(name: &str, length: Option<usize>) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "tinyint" => Self::TinyInt,
            "smallint" => Self::SmallInt,
            "mediumint" => Self::MediumInt,
            "int" | "integer" => Self::Int,
            "bigint" => Self::BigInt,
            "year" => Self::Year,
            "float" => Self::Float,
            "double" => Self::Double,
            "decimal" | "numeric" => Self::Decimal,
            "char" => Self::Char { length: length.unwrap_or(1) },
            "varchar" => Self::Varchar { length: length.unwrap_or(255) },
            "text" | "tinytext" | "mediumtext" | "longtext" => Self::Text,
            "date" => Self::Date,
            "datetime" | "timestamp" => Self::DateTime,
            "point" | "geometry" => Self::Point,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TinyInt => write!(f, "tinyint"),
            Self::SmallInt => write!(f, "smallint"),
            Self::MediumInt => write!(f, "mediumint"),
            Self::Int => write!(f, "int"),
            Self::BigInt => write!(f, "bigint"),
            Self::Year => write!(f, "year"),
            Self::Float => write!(f, "float"),
            Self::Double => write!(f, "double"),
            Self::Decimal => write!(f, "decimal"),
            Self::Char { length } => write!(f, "char({length})"),
            Self::Varchar { length } => write!(f, "varchar({length})"),
            Self::Text => write!(f, "text"),
            Self::Date => write!(f, "date"),
            Self::DateTime => write!(f, "datetime"),
            Self::Enum { values } => write!(f, "enum({})", values.join(",")),
            Self::Point => write!(f, "point"),
            Self::Other(name) => write!(f, "{name}"),
        }
    }
}
