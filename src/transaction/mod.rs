// Transaction management (nested depth counting over the driver's transaction)

mod manager;

pub use manager::TransactionManager;
