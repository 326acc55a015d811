use crate::driver::Driver;
use crate::types::DriverError;

/// Nested transaction counter for one connection.
/// Only the outermost begin/commit reaches the driver; a rollback at any
/// depth rolls back everything and resets the depth to zero.
#[derive(Debug, Clone, Default)]
pub struct TransactionManager {
    depth: u32,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin<D: Driver + ?Sized>(&mut self, driver: &mut D) -> Result<(), DriverError> {
        if self.depth == 0 {
            driver.begin()?;
        }
        self.depth += 1;
        Ok(())
    }

    /// Returns false when no transaction is open.
    pub fn commit<D: Driver + ?Sized>(&mut self, driver: &mut D) -> Result<bool, DriverError> {
        if self.depth == 0 {
            return Ok(false);
        }
        self.depth -= 1;
        if self.depth == 0 {
            driver.commit()?;
        }
        Ok(true)
    }

    /// Returns false when no transaction was open.
    pub fn rollback<D: Driver + ?Sized>(&mut self, driver: &mut D) -> Result<bool, DriverError> {
        if self.depth == 0 {
            return Ok(false);
        }
        // partial rollback is not possible: drop every level
        self.depth = 0;
        driver.rollback()?;
        Ok(true)
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn in_transaction(&self) -> bool {
        self.depth > 0
    }
}
