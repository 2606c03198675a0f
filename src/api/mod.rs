use axum::{
    Router,
    extract::{Json, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::tax::{
    BracketIndex, Country, FilingStatus, IncomeKind, LadderKey, Location, TaxCalculator,
    TaxQuery, TaxResult,
};
use crate::core::{
    BracketDataError, ProjectionResult, SimulationError, SimulationRequest, run_projection,
    tax_year_in_range,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliFilingStatus {
    Single,
    Married,
    Separate,
    HeadOfHousehold,
}

impl From<CliFilingStatus> for FilingStatus {
    fn from(value: CliFilingStatus) -> Self {
        match value {
            CliFilingStatus::Single => FilingStatus::Single,
            CliFilingStatus::Married => FilingStatus::MarriedJointly,
            CliFilingStatus::Separate => FilingStatus::MarriedSeparately,
            CliFilingStatus::HeadOfHousehold => FilingStatus::HeadOfHousehold,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliIncomeKind {
    Ordinary,
    CapitalGains,
}

impl From<CliIncomeKind> for IncomeKind {
    fn from(value: CliIncomeKind) -> Self {
        match value {
            CliIncomeKind::Ordinary => IncomeKind::Ordinary,
            CliIncomeKind::CapitalGains => IncomeKind::CapitalGains,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliCountry {
    Us,
    Ca,
}

impl From<CliCountry> for Country {
    fn from(value: CliCountry) -> Self {
        match value {
            CliCountry::Us => Country::Us,
            CliCountry::Ca => Country::Ca,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "networth",
    version,
    about = "Year-by-year household net worth projection with progressive tax"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP API.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[arg(long, help = "Bracket data JSON replacing the built-in tables")]
        brackets: Option<PathBuf>,
    },
    /// Run one projection from a JSON request file and print the result.
    Project {
        request: PathBuf,
        #[arg(long, help = "Bracket data JSON replacing the built-in tables")]
        brackets: Option<PathBuf>,
        #[arg(long, help = "Print single-line JSON")]
        compact: bool,
    },
    /// Compute tax on a single amount.
    Tax(TaxArgs),
}

#[derive(Debug, Args)]
struct TaxArgs {
    #[arg(long, allow_negative_numbers = true)]
    amount: f64,
    #[arg(long, value_enum, default_value_t = CliIncomeKind::Ordinary)]
    kind: CliIncomeKind,
    #[arg(long, value_enum, default_value_t = CliFilingStatus::Single)]
    filing_status: CliFilingStatus,
    #[arg(long, value_enum, default_value_t = CliCountry::Us)]
    country: CliCountry,
    #[arg(long, help = "State or province code, e.g. NY or ON")]
    jurisdiction: Option<String>,
    #[arg(long, help = "Tax year; defaults to the bracket base year")]
    year: Option<i32>,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Annual inflation in percent used to index bracket edges"
    )]
    inflation: f64,
    #[arg(long, help = "Bracket data JSON replacing the built-in tables")]
    brackets: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid request JSON: {0}")]
    RequestJson(#[from] serde_json::Error),
    #[error("bracket data: {0}")]
    Brackets(#[from] BracketDataError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error("server error: {0}")]
    Server(#[source] std::io::Error),
}

fn load_index(path: Option<&Path>) -> Result<BracketIndex, BracketDataError> {
    let index = match path {
        Some(path) => BracketIndex::from_path(path)?,
        None => BracketIndex::builtin()?,
    };
    info!(
        ladders = index.len(),
        base_year = index.base_year(),
        "loaded bracket index"
    );
    Ok(index)
}

fn print_json<T: Serialize>(value: &T, compact: bool) -> Result<(), CommandError> {
    let rendered = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{rendered}");
    Ok(())
}

pub async fn run_cli(cli: Cli) -> Result<(), CommandError> {
    match cli.command {
        Command::Serve { port, brackets } => {
            let index = load_index(brackets.as_deref())?;
            run_http_server(port, index)
                .await
                .map_err(CommandError::Server)
        }
        Command::Project {
            request,
            brackets,
            compact,
        } => {
            let raw = std::fs::read_to_string(&request).map_err(|source| CommandError::Read {
                path: request.clone(),
                source,
            })?;
            let index = load_index(brackets.as_deref())?;
            let inputs = SimulationRequest::from_json(&raw)?.into_inputs()?;
            let result = run_projection(&inputs, &index)?;
            print_json(&result, compact)
        }
        Command::Tax(args) => {
            let index = load_index(args.brackets.as_deref())?;
            let payload = TaxPayload::from(args);
            let result = compute_tax(&index, &payload)?;
            print_json(&result, false)
        }
    }
}

#[derive(Clone)]
struct AppState {
    index: Arc<BracketIndex>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JurisdictionsResponse<'a> {
    base_year: i32,
    ladders: Vec<&'a LadderKey>,
}

#[derive(Debug, Error)]
enum ApiError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("invalid {field}: {reason}")]
    InvalidParameter {
        field: &'static str,
        reason: &'static str,
    },
}

impl ApiError {
    fn status(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}

impl From<ApiError> for CommandError {
    fn from(value: ApiError) -> Self {
        match value {
            ApiError::Json(e) => CommandError::RequestJson(e),
            ApiError::Simulation(e) => CommandError::Simulation(e),
            other => CommandError::Simulation(SimulationError::invalid(
                "tax query",
                other.to_string(),
            )),
        }
    }
}

/// Query parameters for a one-off tax computation. Rates are in percent.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TaxPayload {
    amount: Option<f64>,
    kind: Option<IncomeKind>,
    filing_status: Option<FilingStatus>,
    country: Option<Country>,
    jurisdiction: Option<String>,
    year: Option<i32>,
    inflation_rate: Option<f64>,
}

impl From<TaxArgs> for TaxPayload {
    fn from(args: TaxArgs) -> Self {
        Self {
            amount: Some(args.amount),
            kind: Some(args.kind.into()),
            filing_status: Some(args.filing_status.into()),
            country: Some(args.country.into()),
            jurisdiction: args.jurisdiction,
            year: args.year,
            inflation_rate: Some(args.inflation),
        }
    }
}

fn compute_tax(index: &BracketIndex, payload: &TaxPayload) -> Result<TaxResult, ApiError> {
    let amount = payload.amount.ok_or(ApiError::MissingParameter("amount"))?;
    if !amount.is_finite() {
        return Err(ApiError::InvalidParameter {
            field: "amount",
            reason: "must be a finite number",
        });
    }
    let inflation_rate = payload.inflation_rate.unwrap_or(0.0);
    if !inflation_rate.is_finite() || inflation_rate <= -100.0 {
        return Err(ApiError::InvalidParameter {
            field: "inflationRate",
            reason: "must be greater than -100 percent",
        });
    }

    let tax_year = payload.year.unwrap_or(index.base_year());
    if !tax_year_in_range(i64::from(tax_year), index.base_year()) {
        return Err(ApiError::InvalidParameter {
            field: "year",
            reason: "must be within 200 years of the bracket base year",
        });
    }

    let country = payload.country.unwrap_or(Country::Us);
    let location = match payload.jurisdiction.as_deref() {
        Some(code) => Location::new(country, code),
        None => Location::federal_only(country),
    };
    let result = TaxCalculator::new(index).compute(&TaxQuery {
        amount,
        kind: payload.kind.unwrap_or(IncomeKind::Ordinary),
        filing_status: payload.filing_status.unwrap_or(FilingStatus::Single),
        location: &location,
        tax_year,
        inflation_rate,
    });
    if result.not_available {
        warn!(
            country = country.code(),
            jurisdiction = ?payload.jurisdiction,
            "tax computed with missing brackets"
        );
    }
    Ok(result)
}

fn simulate_from_json(index: &BracketIndex, raw: &str) -> Result<ProjectionResult, ApiError> {
    let inputs = SimulationRequest::from_json(raw)?.into_inputs()?;
    Ok(run_projection(&inputs, index)?)
}

pub async fn run_http_server(port: u16, index: BracketIndex) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let state = AppState {
        index: Arc::new(index),
    };
    let app = Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/simulate", post(simulate_handler))
        .route("/api/tax", get(tax_handler))
        .route("/api/jurisdictions", get(jurisdictions_handler))
        .fallback(not_found_handler)
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "networth HTTP API listening");
    info!("local access: http://127.0.0.1:{port}/api/health");

    axum::serve(listener, app).await
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, HealthResponse { status: "ok" })
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_handler(State(state): State<AppState>, body: String) -> Response {
    match simulate_from_json(&state.index, &body) {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(e) => {
            warn!(error = %e, "rejected projection request");
            error_response(e.status(), &e.to_string())
        }
    }
}

async fn tax_handler(State(state): State<AppState>, Query(payload): Query<TaxPayload>) -> Response {
    match compute_tax(&state.index, &payload) {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(e) => {
            warn!(error = %e, "rejected tax query");
            error_response(e.status(), &e.to_string())
        }
    }
}

async fn jurisdictions_handler(State(state): State<AppState>) -> Response {
    json_response(StatusCode::OK, jurisdictions(&state.index))
}

fn jurisdictions(index: &BracketIndex) -> JurisdictionsResponse<'_> {
    JurisdictionsResponse {
        base_year: index.base_year(),
        ladders: index.keys(),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}
