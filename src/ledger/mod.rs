pub mod models;
pub mod repository;
pub mod store;

pub use repository::PgLedgerStore;
pub use store::LedgerStore;
