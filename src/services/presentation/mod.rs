// Presentation of the PEDIDOS result set: HTML table and JSON envelope
pub mod html;
pub mod json;

pub use html::HtmlTablePresenter;
pub use json::{DepositEnvelope, JsonEnvelopePresenter, PedidosEnvelope};

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::models::ResultSet;
use crate::services::database::DataSourceError;

/// Outcome of one data-source call, as handed to a presenter
pub type FetchOutcome = Result<ResultSet, DataSourceError>;

/// A rendered response body with its status and content type
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: String,
}

impl Document {
    pub fn new(status: StatusCode, content_type: &'static str, body: String) -> Self {
        Self {
            status,
            content_type,
            body,
        }
    }
}

impl IntoResponse for Document {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, self.content_type)],
            self.body,
        )
            .into_response()
    }
}

/// Renders a fetch outcome. Errors are part of the document, never dropped.
pub trait Presenter: Send + Sync {
    fn present(&self, outcome: &FetchOutcome) -> Document;
}
