// Driver seam: statement execution, row streaming and transaction control
mod recording;

pub use recording::{RecordingDriver, TxCall};

use crate::sql::Quoter;
use crate::types::{DriverError, Row};

/// Result of a statement that returns no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub affected: u64,
    /// Key generated by an INSERT, when the store reports one.
    pub last_insert_id: Option<i64>,
}

/// Lazy, single-pass row sequence of a query.
pub type RowIter<'a> = Box<dyn Iterator<Item = Result<Row, DriverError>> + 'a>;

/// The store operations the engine needs. Quoting comes from [`Quoter`],
/// whose default follows MySQL escaping.
pub trait Driver: Quoter {
    fn execute(&mut self, sql: &str) -> Result<ExecOutcome, DriverError>;

    fn query(&mut self, sql: &str) -> Result<RowIter<'_>, DriverError>;

    fn begin(&mut self) -> Result<(), DriverError>;

    fn commit(&mut self) -> Result<(), DriverError>;

    fn rollback(&mut self) -> Result<(), DriverError>;
}

/// Which language is current and how missing translations fall back.
pub trait LanguageResolver {
    fn current(&self) -> &str;

    /// Every language a translatable field may be written in.
    fn languages(&self) -> &[String];

    /// Languages to try, in order, when `lang` has no translation.
    fn fallbacks(&self, lang: &str) -> Vec<String>;
}

/// A fixed language list with at most one fallback language.
#[derive(Debug, Clone)]
pub struct FixedLanguages {
    current: String,
    languages: Vec<String>,
    fallback: Option<String>,
}

impl FixedLanguages {
    pub fn new(current: impl Into<String>) -> Self {
        let current = current.into();
        Self {
            languages: vec![current.clone()],
            current,
            fallback: None,
        }
    }

    #[must_use]
    pub fn with_languages<S: Into<String>>(mut self, languages: impl IntoIterator<Item = S>) -> Self {
        self.languages = languages.into_iter().map(Into::into).collect();
        if !self.languages.contains(&self.current) {
            self.languages.insert(0, self.current.clone());
        }
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, lang: impl Into<String>) -> Self {
        self.fallback = Some(lang.into());
        self
    }

    pub fn set_current(&mut self, lang: impl Into<String>) {
        self.current = lang.into();
    }
}

impl Default for FixedLanguages {
    fn default() -> Self {
        Self::new("en")
    }
}

impl LanguageResolver for FixedLanguages {
    fn current(&self) -> &str {
        &self.current
    }

    fn languages(&self) -> &[String] {
        &self.languages
    }

    fn fallbacks(&self, lang: &str) -> Vec<String> {
        self.fallback
            .iter()
            .filter(|f| f.as_str() != lang)
            .cloned()
            .collect()
    }
}
