// Database access for the PEDIDOS table
pub mod adapter;
pub mod mssql;

pub use adapter::{DataSource, DataSourceError, MAX_DEPOSIT_BATCH, PEDIDOS_QUERY};
pub use mssql::MssqlDataSource;
