pub mod catalog_client;
pub mod models;
pub mod order_repo;
pub mod printer;
pub mod transaction_client;
