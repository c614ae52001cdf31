// SQL Server adapter: one connection per request, closed when the query is done
use crate::config::DatabaseConfig;
use crate::models::{CellValue, DepositKey, MatchValue, ResultSet, Row};
use crate::services::database::adapter::{
    deposit_update_sql, DataSource, DataSourceError, PEDIDOS_QUERY,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::time::{Duration, Instant};
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, FromSql, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

type MssqlClient = Client<Compat<TcpStream>>;

pub struct MssqlDataSource {
    config: DatabaseConfig,
}

impl MssqlDataSource {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    fn tiberius_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.name);
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            self.config.password.as_deref().unwrap_or(""),
        ));

        if self.config.encrypt {
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        if self.config.trust_cert {
            config.trust_cert();
        }

        config
    }

    /// Open a connection, bounded by the configured connect timeout
    #[tracing::instrument(skip(self), fields(target = %self.describe()))]
    async fn connect(&self) -> Result<MssqlClient, DataSourceError> {
        let timeout_secs = self.config.connect_timeout_secs;

        tokio::time::timeout(Duration::from_secs(timeout_secs), self.connect_inner())
            .await
            .map_err(|_| {
                DataSourceError::Connection(format!(
                    "Connection timeout after {} seconds",
                    timeout_secs
                ))
            })?
    }

    async fn connect_inner(&self) -> Result<MssqlClient, DataSourceError> {
        let config = self.tiberius_config();

        match Self::connect_with(config).await {
            // Azure SQL gateways may redirect the login to another node
            Err(tiberius::error::Error::Routing { host, port }) => {
                tracing::debug!("Login redirected to {}:{}", host, port);
                let mut config = self.tiberius_config();
                config.host(&host);
                config.port(port);
                Self::connect_with(config)
                    .await
                    .map_err(|e| DataSourceError::Connection(e.to_string()))
            }
            other => other.map_err(|e| DataSourceError::Connection(e.to_string())),
        }
    }

    async fn connect_with(config: Config) -> Result<MssqlClient, tiberius::error::Error> {
        let tcp = TcpStream::connect(config.get_addr()).await?;
        tcp.set_nodelay(true)?;
        Client::connect(config, tcp.compat_write()).await
    }

    async fn run_query(client: &mut MssqlClient) -> Result<ResultSet, DataSourceError> {
        let mut stream = client
            .simple_query(PEDIDOS_QUERY)
            .await
            .map_err(|e| DataSourceError::Query(e.to_string()))?;

        // Column metadata arrives before any row, so an empty table keeps its header
        let columns: Vec<String> = stream
            .columns()
            .await
            .map_err(|e| DataSourceError::Query(e.to_string()))?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let tib_rows = stream
            .into_first_result()
            .await
            .map_err(|e| DataSourceError::Query(e.to_string()))?;

        let mut rows = Vec::with_capacity(tib_rows.len());
        for tib_row in tib_rows {
            let mut row = Row::default();
            for (name, data) in columns.iter().zip(tib_row.into_iter()) {
                row.push(name.clone(), column_data_to_cell(data)?);
            }
            rows.push(row);
        }

        Ok(ResultSet::new(columns, rows))
    }

    async fn run_deposit(client: &mut MssqlClient, keys: &[DepositKey]) -> Result<u64, DataSourceError> {
        let sql = deposit_update_sql(keys.len());
        let null: Option<String> = None;

        let mut params: Vec<&dyn ToSql> = Vec::with_capacity(keys.len() * 3);
        for key in keys {
            for value in key.values() {
                params.push(match value {
                    Some(MatchValue::Number(n)) => n as &dyn ToSql,
                    Some(MatchValue::Text(t)) => t as &dyn ToSql,
                    None => &null as &dyn ToSql,
                });
            }
        }

        let result = client
            .execute(sql, &params)
            .await
            .map_err(|e| DataSourceError::Query(e.to_string()))?;
        Ok(result.total())
    }
}

#[async_trait::async_trait]
impl DataSource for MssqlDataSource {
    async fn fetch_all(&self) -> Result<ResultSet, DataSourceError> {
        tracing::info!("Connecting to SQL Server: {}", self.describe());
        let mut client = self.connect().await.map_err(|e| {
            tracing::error!("Failed to connect: {}", e);
            e
        })?;

        let start_time = Instant::now();
        tracing::info!("Executing query: {}", PEDIDOS_QUERY);
        let result = Self::run_query(&mut client).await;

        if let Err(e) = client.close().await {
            tracing::warn!("Failed to close SQL Server connection: {}", e);
        } else {
            tracing::debug!("SQL Server connection closed");
        }

        match &result {
            Ok(result_set) => tracing::info!(
                row_count = result_set.row_count(),
                duration_ms = start_time.elapsed().as_millis() as u64,
                "Query completed"
            ),
            Err(e) => tracing::error!("Query execution error: {}", e),
        }

        result
    }

    async fn mark_deposited(&self, keys: &[DepositKey]) -> Result<u64, DataSourceError> {
        tracing::info!("Marking {} PEDIDOS as deposited on {}", keys.len(), self.describe());
        let mut client = self.connect().await.map_err(|e| {
            tracing::error!("Failed to connect: {}", e);
            e
        })?;

        let result = Self::run_deposit(&mut client, keys).await;

        if let Err(e) = client.close().await {
            tracing::warn!("Failed to close SQL Server connection: {}", e);
        }

        match &result {
            Ok(updated) => tracing::info!(updated = *updated, "Deposit update completed"),
            Err(e) => tracing::error!("Deposit update error: {}", e),
        }

        result
    }

    fn describe(&self) -> String {
        format!(
            "mssql://{}:{}/{}",
            self.config.host, self.config.port, self.config.name
        )
    }
}

fn temporal<'a, T: FromSql<'a>>(data: &'a ColumnData<'static>) -> Result<Option<T>, DataSourceError> {
    T::from_sql(data).map_err(|e| DataSourceError::Query(format!("Failed to decode column: {}", e)))
}

/// Convert one tiberius column value into a [`CellValue`]
pub(crate) fn column_data_to_cell(data: ColumnData<'static>) -> Result<CellValue, DataSourceError> {
    let cell = match data {
        ColumnData::Bit(v) => v.into(),
        ColumnData::U8(v) => v.map(i64::from).into(),
        ColumnData::I16(v) => v.map(i64::from).into(),
        ColumnData::I32(v) => v.map(i64::from).into(),
        ColumnData::I64(v) => v.into(),
        ColumnData::F32(v) => v.map(f64::from).into(),
        ColumnData::F64(v) => v.into(),
        ColumnData::String(v) => v.map(|s| CellValue::Text(s.into_owned())).into(),
        ColumnData::Guid(v) => v.map(|g| CellValue::Text(g.to_string())).into(),
        ColumnData::Binary(v) => v.map(|bytes| CellValue::Text(to_hex(&bytes))).into(),
        ColumnData::Numeric(v) => v
            .map(|n| n.value() as f64 / 10f64.powi(i32::from(n.scale())))
            .into(),
        ColumnData::Xml(v) => v
            .map(|xml| CellValue::Text(xml.into_owned().into_string()))
            .into(),
        ColumnData::Date(_) => temporal::<NaiveDate>(&data)?
            .map(|d| d.and_time(NaiveTime::default()))
            .into(),
        ColumnData::Time(_) => temporal::<NaiveTime>(&data)?
            .map(|t| CellValue::Text(t.format("%H:%M:%S").to_string()))
            .into(),
        ColumnData::DateTimeOffset(_) => temporal::<DateTime<Utc>>(&data)?
            .map(|dt| dt.naive_utc())
            .into(),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            temporal::<NaiveDateTime>(&data)?.into()
        }
    };
    Ok(cell)
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for byte in bytes {
        out.push_str(&format!("{:02X}", byte));
    }
    out
}
