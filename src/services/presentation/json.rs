use axum::http::StatusCode;
use serde::Serialize;

use crate::models::Row;
use crate::services::database::DataSourceError;
use crate::services::presentation::{Document, FetchOutcome, Presenter};

pub const SUCCESS_MESSAGE: &str = "Dados carregados com sucesso!";
pub const FAILURE_MESSAGE: &str = "Erro ao conectar com o banco de dados";
pub const NO_ORDERS_ERROR: &str = "Nenhum pedido";

const JSON_CONTENT_TYPE: &str = "application/json";

/// Body of `GET /api/pedidos`
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PedidosEnvelope<'a> {
    Success {
        success: bool,
        data: &'a [Row],
        message: &'static str,
    },
    Failure {
        success: bool,
        error: String,
        message: &'static str,
    },
}

impl<'a> PedidosEnvelope<'a> {
    pub fn success(data: &'a [Row]) -> Self {
        PedidosEnvelope::Success {
            success: true,
            data,
            message: SUCCESS_MESSAGE,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        PedidosEnvelope::Failure {
            success: false,
            error: error.into(),
            message: FAILURE_MESSAGE,
        }
    }
}

/// Body of `POST /api/pedidos/depositar`
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum DepositEnvelope {
    Success {
        success: bool,
        message: String,
        pedidos_atualizados: u64,
    },
    Failure {
        success: bool,
        error: String,
    },
}

impl DepositEnvelope {
    pub fn success(updated: u64) -> Self {
        DepositEnvelope::Success {
            success: true,
            message: format!("{} pedidos depositados", updated),
            pedidos_atualizados: updated,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        DepositEnvelope::Failure {
            success: false,
            error: error.into(),
        }
    }
}

/// JSON API presenter: 200 with the rows, or 500 with the error message
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEnvelopePresenter;

impl JsonEnvelopePresenter {
    /// 200 with the update count, or 500 with the error message
    pub fn present_deposit(&self, outcome: &Result<u64, DataSourceError>) -> Document {
        match outcome {
            Ok(updated) => to_document(StatusCode::OK, &DepositEnvelope::success(*updated)),
            Err(e) => to_document(
                StatusCode::INTERNAL_SERVER_ERROR,
                &DepositEnvelope::failure(e.to_string()),
            ),
        }
    }

    /// 400 for a deposit request that never reached the database
    pub fn reject_deposit(&self, error: impl Into<String>) -> Document {
        to_document(StatusCode::BAD_REQUEST, &DepositEnvelope::failure(error))
    }
}

impl Presenter for JsonEnvelopePresenter {
    fn present(&self, outcome: &FetchOutcome) -> Document {
        match outcome {
            Ok(result) => to_document(StatusCode::OK, &PedidosEnvelope::success(&result.rows)),
            Err(e) => to_document(
                StatusCode::INTERNAL_SERVER_ERROR,
                &PedidosEnvelope::failure(e.to_string()),
            ),
        }
    }
}

fn to_document<T: Serialize>(status: StatusCode, envelope: &T) -> Document {
    match serde_json::to_string(envelope) {
        Ok(body) => Document::new(status, JSON_CONTENT_TYPE, body),
        Err(e) => {
            tracing::error!("Failed to serialize JSON envelope: {}", e);
            let fallback = serde_json::json!({
                "success": false,
                "error": e.to_string(),
                "message": FAILURE_MESSAGE,
            });
            Document::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                JSON_CONTENT_TYPE,
                fallback.to_string(),
            )
        }
    }
}
