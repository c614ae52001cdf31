use axum::http::StatusCode;
use minijinja::{context, Environment, Value};

use crate::models::{CellValue, ResultSet};
use crate::services::presentation::{Document, FetchOutcome, Presenter};

const TEMPLATE_NAME: &str = "pedidos.html";
const TEMPLATE_SOURCE: &str = include_str!("../../../templates/pedidos.html");
const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Server-rendered HTML table of PEDIDOS.
///
/// The template is auto-escaped, so every column name, cell and error
/// message goes through HTML escaping. NULL renders as `<em>NULL</em>`.
pub struct HtmlTablePresenter {
    env: Environment<'static>,
}

impl HtmlTablePresenter {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template(TEMPLATE_NAME, TEMPLATE_SOURCE)?;
        Ok(Self { env })
    }

    fn render(&self, outcome: &FetchOutcome) -> Result<String, minijinja::Error> {
        let tmpl = self.env.get_template(TEMPLATE_NAME)?;
        match outcome {
            Ok(result) => tmpl.render(context! {
                columns => &result.columns,
                rows => table_cells(result),
                colspan => result.columns.len().max(1),
            }),
            Err(e) => tmpl.render(context! {
                error => e.to_string(),
            }),
        }
    }
}

/// Cells in header order. Timestamps are pre-formatted digits, slashes and
/// colons, so they are passed as safe strings to keep the slashes literal.
fn table_cells(result: &ResultSet) -> Vec<Vec<Value>> {
    result
        .rows
        .iter()
        .map(|row| {
            result
                .columns
                .iter()
                .map(|column| match row.get(column).unwrap_or(&CellValue::Null) {
                    CellValue::Null => Value::from(()),
                    CellValue::Timestamp(ts) => Value::from_safe_string(
                        ts.format(crate::models::DISPLAY_DATETIME_FORMAT).to_string(),
                    ),
                    other => Value::from(other.display_text().unwrap_or_default()),
                })
                .collect()
        })
        .collect()
}

impl Presenter for HtmlTablePresenter {
    fn present(&self, outcome: &FetchOutcome) -> Document {
        let status = match outcome {
            Ok(_) => StatusCode::OK,
            Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        match self.render(outcome) {
            Ok(body) => Document::new(status, HTML_CONTENT_TYPE, body),
            Err(e) => {
                tracing::error!("Failed to render PEDIDOS table: {}", e);
                Document::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain; charset=utf-8",
                    format!("Erro ao renderizar a página: {}", e),
                )
            }
        }
    }
}
