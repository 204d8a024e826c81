pub mod balances;
pub mod reviews;
pub mod sweeps;
pub mod transactions;
