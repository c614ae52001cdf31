use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::sync::Arc;

use crate::config::Config;
use crate::models::DepositRequest;
use crate::services::presentation::json::NO_ORDERS_ERROR;
use crate::services::{
    DataSource, Document, FetchOutcome, HtmlTablePresenter, JsonEnvelopePresenter, Presenter,
    MAX_DEPOSIT_BATCH,
};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn DataSource>,
    pub config: Config,
    pub html: Arc<HtmlTablePresenter>,
    pub json: JsonEnvelopePresenter,
}

impl AppState {
    pub fn new(source: Arc<dyn DataSource>, config: Config) -> Result<Self, minijinja::Error> {
        Ok(Self {
            source,
            config,
            html: Arc::new(HtmlTablePresenter::new()?),
            json: JsonEnvelopePresenter,
        })
    }
}

/// Run the PEDIDOS query once and log the outcome
async fn fetch_pedidos(state: &AppState) -> FetchOutcome {
    let outcome = state.source.fetch_all().await;
    match &outcome {
        Ok(result) if result.is_empty() => {
            tracing::warn!("PEDIDOS returned no rows from {}", state.source.describe())
        }
        Ok(result) => tracing::info!(
            "Loaded {} PEDIDOS rows from {}",
            result.row_count(),
            state.source.describe()
        ),
        Err(e) => tracing::error!(code = e.code(), "Failed to load PEDIDOS: {}", e),
    }
    outcome
}

/// `GET /api/pedidos`: JSON envelope for the dashboard
pub async fn list_pedidos(State(state): State<AppState>) -> Document {
    let outcome = fetch_pedidos(&state).await;
    state.json.present(&outcome)
}

/// `GET /pedidos`: server-rendered table
pub async fn render_pedidos_table(State(state): State<AppState>) -> Document {
    let outcome = fetch_pedidos(&state).await;
    state.html.present(&outcome)
}

/// `POST /api/pedidos/depositar`: mark the listed orders as deposited
pub async fn deposit_pedidos(
    State(state): State<AppState>,
    payload: Result<Json<DepositRequest>, JsonRejection>,
) -> Document {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!("Rejected deposit request: {}", rejection.body_text());
            return state.json.reject_deposit(rejection.body_text());
        }
    };

    if request.pedidos.is_empty() {
        return state.json.reject_deposit(NO_ORDERS_ERROR);
    }
    if request.pedidos.len() > MAX_DEPOSIT_BATCH {
        return state.json.reject_deposit(format!(
            "No máximo {} pedidos por requisição",
            MAX_DEPOSIT_BATCH
        ));
    }

    let outcome = state.source.mark_deposited(&request.pedidos).await;
    match &outcome {
        Ok(updated) => tracing::info!(
            requested = request.pedidos.len(),
            "Marked {} PEDIDOS rows as deposited",
            updated
        ),
        Err(e) => tracing::error!(code = e.code(), "Failed to mark PEDIDOS as deposited: {}", e),
    }
    state.json.present_deposit(&outcome)
}
