pub mod database; // SQL Server access for PEDIDOS
pub mod presentation; // HTML table and JSON envelope

pub use database::{DataSource, DataSourceError, MssqlDataSource, MAX_DEPOSIT_BATCH};
pub use presentation::{Document, FetchOutcome, HtmlTablePresenter, JsonEnvelopePresenter, Presenter};
