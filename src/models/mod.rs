pub mod common;
pub mod errors;
pub mod transactions;
pub mod users;
