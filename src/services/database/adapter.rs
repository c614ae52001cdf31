// Data source abstraction for the PEDIDOS query and the deposit update
use crate::models::{DepositKey, ResultSet};
use thiserror::Error;

/// The one read query this application runs
pub const PEDIDOS_QUERY: &str = "SELECT * FROM PEDIDOS";

/// Value written to `DEPOSITADO` for settled orders
pub const DEPOSITED_MARK: &str = "DEPOSITADO";

/// Orders per update statement; each binds three of SQL Server's 2100 parameters
pub const MAX_DEPOSIT_BATCH: usize = 699;

/// One UPDATE marking every matching order as deposited, with `@P1..` bound
/// as (responsible, pagcorp, total) per order. Already deposited rows are
/// left alone so the returned count only covers real changes.
pub fn deposit_update_sql(count: usize) -> String {
    let conditions: Vec<String> = (0..count)
        .map(|i| {
            let first = i * 3 + 1;
            format!(
                "(RESPONSAVEL_PELO_CARTAO = @P{} AND PAGCORP = @P{} AND TOTAL_PAGAR = @P{})",
                first,
                first + 1,
                first + 2
            )
        })
        .collect();

    format!(
        "UPDATE PEDIDOS SET DEPOSITADO = '{mark}' \
         WHERE (DEPOSITADO IS NULL OR DEPOSITADO <> '{mark}') AND ({conditions})",
        mark = DEPOSITED_MARK,
        conditions = conditions.join(" OR ")
    )
}

/// Errors raised while fetching PEDIDOS
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataSourceError {
    #[error("Erro na conexão: {0}")]
    Connection(String),

    #[error("Erro na consulta: {0}")]
    Query(String),
}

impl DataSourceError {
    pub fn code(&self) -> &'static str {
        match self {
            DataSourceError::Connection(_) => "CONNECTION_ERROR",
            DataSourceError::Query(_) => "QUERY_ERROR",
        }
    }
}

/// Data source trait - the HTTP layer only ever sees this
///
/// Implementations open a connection, run [`PEDIDOS_QUERY`], materialize
/// every row and close the connection again, on success and on failure.
/// No retries: errors are handed back as-is.
#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch_all(&self) -> Result<ResultSet, DataSourceError>;

    /// Mark the given orders as deposited in one statement, returning the
    /// number of rows changed. Callers keep batches within [`MAX_DEPOSIT_BATCH`].
    async fn mark_deposited(&self, keys: &[DepositKey]) -> Result<u64, DataSourceError>;

    /// Human readable target, safe to log
    fn describe(&self) -> String;
}
