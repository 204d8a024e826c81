pub mod balances;
pub mod reviews;
pub mod transactions;
pub mod users;
