use chrono::NaiveDateTime;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Display format used for timestamps in the HTML table
pub const DISPLAY_DATETIME_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// A single column value as returned by the PEDIDOS query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl CellValue {
    /// Text shown in a table cell, `None` for SQL NULL
    pub fn display_text(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            CellValue::Bool(v) => Some(if *v { "1" } else { "0" }.to_string()),
            CellValue::Int(v) => Some(v.to_string()),
            CellValue::Float(v) => Some(v.to_string()),
            CellValue::Text(v) => Some(v.clone()),
            CellValue::Timestamp(v) => Some(v.format(DISPLAY_DATETIME_FORMAT).to_string()),
        }
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Int(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Float(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(value: NaiveDateTime) -> Self {
        CellValue::Timestamp(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Null)
    }
}

/// One row of PEDIDOS, ordered as the query returned the columns.
/// Serializes as a JSON object that keeps that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, CellValue)>,
}

impl Row {
    pub fn new(cells: Vec<(String, CellValue)>) -> Self {
        Self { cells }
    }

    pub fn push(&mut self, column: impl Into<String>, value: CellValue) {
        self.cells.push((column.into(), value));
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (column, value) in &self.cells {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Materialized result of the PEDIDOS query.
///
/// Column names come from the query metadata, so an empty table still
/// carries its header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Build a result set from rows alone, taking the header from the first row
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let columns = rows
            .first()
            .map(|row| row.columns().map(str::to_string).collect())
            .unwrap_or_default();
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Value a deposit key column is matched against. The dashboard echoes the
/// rows it received, so numbers and text both show up here.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MatchValue {
    Number(f64),
    Text(String),
}

/// Identifies one order to mark as deposited. Extra row columns are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DepositKey {
    #[serde(rename = "RESPONSAVEL_PELO_CARTAO", default)]
    pub responsavel_pelo_cartao: Option<MatchValue>,
    #[serde(rename = "PAGCORP", default)]
    pub pagcorp: Option<MatchValue>,
    #[serde(rename = "TOTAL_PAGAR", default)]
    pub total_pagar: Option<MatchValue>,
}

impl DepositKey {
    /// Values in the order the update statement binds them
    pub fn values(&self) -> [Option<&MatchValue>; 3] {
        [
            self.responsavel_pelo_cartao.as_ref(),
            self.pagcorp.as_ref(),
            self.total_pagar.as_ref(),
        ]
    }
}

/// Body of `POST /api/pedidos/depositar`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DepositRequest {
    #[serde(default)]
    pub pedidos: Vec<DepositKey>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_row_serializes_in_column_order() {
        let row = Row::new(vec![
            ("zeta".to_string(), CellValue::Int(1)),
            ("alpha".to_string(), CellValue::Null),
            ("mid".to_string(), CellValue::from("x")),
        ]);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"zeta":1,"alpha":null,"mid":"x"}"#);
    }

    #[test]
    fn test_timestamp_serializes_as_iso_string() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 7, 9)
            .unwrap();
        let json = serde_json::to_value(CellValue::Timestamp(ts)).unwrap();
        assert_eq!(json, serde_json::json!("2024-03-05T14:07:09"));
    }

    #[test]
    fn test_display_text() {
        let ts = NaiveDate::from_ymd_opt(2023, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 1)
            .unwrap();
        assert_eq!(CellValue::Timestamp(ts).display_text().unwrap(), "31/12/2023 23:59:01");
        assert_eq!(CellValue::Float(10.5).display_text().unwrap(), "10.5");
        assert_eq!(CellValue::Bool(true).display_text().unwrap(), "1");
        assert!(CellValue::Null.display_text().is_none());
    }

    #[test]
    fn test_from_option() {
        assert_eq!(CellValue::from(None::<i64>), CellValue::Null);
        assert_eq!(CellValue::from(Some(7i64)), CellValue::Int(7));
    }

    #[test]
    fn test_result_set_header_from_first_row() {
        let rows = vec![Row::new(vec![
            ("id".to_string(), CellValue::Int(1)),
            ("valor".to_string(), CellValue::Null),
        ])];
        let result = ResultSet::from_rows(rows);
        assert_eq!(result.columns, vec!["id", "valor"]);
        assert_eq!(result.row_count(), 1);

        assert!(ResultSet::from_rows(vec![]).columns.is_empty());
    }

    #[test]
    fn test_deposit_request_from_dashboard_rows() {
        let request: DepositRequest = serde_json::from_str(
            r#"{"pedidos":[
                {"ID":7,"RESPONSAVEL_PELO_CARTAO":"Ana","PAGCORP":"PC-01","TOTAL_PAGAR":150.25},
                {"RESPONSAVEL_PELO_CARTAO":null,"PAGCORP":42}
            ]}"#,
        )
        .unwrap();

        assert_eq!(request.pedidos.len(), 2);
        let first = &request.pedidos[0];
        assert_eq!(first.responsavel_pelo_cartao, Some(MatchValue::Text("Ana".to_string())));
        assert_eq!(first.total_pagar, Some(MatchValue::Number(150.25)));

        let second = &request.pedidos[1];
        assert!(second.responsavel_pelo_cartao.is_none());
        assert_eq!(second.values()[1], Some(&MatchValue::Number(42.0)));
        assert!(second.total_pagar.is_none());
    }

    #[test]
    fn test_deposit_request_defaults_to_empty() {
        let request: DepositRequest = serde_json::from_str("{}").unwrap();
        assert!(request.pedidos.is_empty());
    }
}
