//! Single-page web UI and its JSON API.

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::GenerationDefaults;
use crate::error::{SummarizeError, EMPTY_INPUT_WARNING};
use crate::model::Seq2SeqModel;
use crate::request::{
    SummaryRequest, SummaryResponse, MAX_BEAMS, MAX_TEMPERATURE, MIN_BEAMS, MIN_TEMPERATURE,
};
use crate::summarizer::Summarizer;

const INDEX_HTML: &str = include_str!("../assets/index.html");

pub struct AppState<M> {
    summarizer: Arc<Mutex<Summarizer<M>>>,
    defaults: GenerationDefaults,
    model_name: String,
}

impl<M> Clone for AppState<M> {
    fn clone(&self) -> Self {
        Self {
            summarizer: Arc::clone(&self.summarizer),
            defaults: self.defaults.clone(),
            model_name: self.model_name.clone(),
        }
    }
}

impl<M: Seq2SeqModel> AppState<M> {
    pub fn new(summarizer: Summarizer<M>, defaults: GenerationDefaults) -> Self {
        let model_name = summarizer.model_name().to_string();
        Self {
            summarizer: Arc::new(Mutex::new(summarizer)),
            defaults,
            model_name,
        }
    }
}

/// Body of `POST /api/summarize`. Missing controls take the configured defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SummaryForm {
    pub text: String,
    pub max_length: Option<usize>,
    pub temperature: Option<f64>,
    pub num_beams: Option<usize>,
    pub do_sample: Option<bool>,
}

impl SummaryForm {
    pub fn into_request(self, defaults: &GenerationDefaults) -> SummaryRequest {
        SummaryRequest {
            text: self.text,
            max_length: self.max_length.unwrap_or(defaults.max_length),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            num_beams: self.num_beams.unwrap_or(defaults.num_beams),
            do_sample: self.do_sample.unwrap_or(defaults.do_sample),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// Shown to the user as a warning; nothing was generated.
    Warning(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Warning(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({ "warning": msg }),
            ),
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
            }
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": msg }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

impl From<SummarizeError> for ApiError {
    fn from(err: SummarizeError) -> Self {
        match err {
            SummarizeError::EmptyInput => ApiError::Warning(EMPTY_INPUT_WARNING.to_string()),
            SummarizeError::Model(e) => ApiError::Internal(format!("{:#}", e)),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

pub fn router<M: Seq2SeqModel + 'static>(state: AppState<M>) -> Router {
    Router::new()
        .route("/", get(index::<M>))
        .route("/api/health", get(health::<M>))
        .route("/api/summarize", post(summarize::<M>))
        .with_state(state)
}

pub async fn serve<M: Seq2SeqModel + 'static>(state: AppState<M>, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    log::info!("Text Summarizer listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .await
        .context("Server error")?;
    Ok(())
}

/// Fills the slider ranges and initial values into the page.
pub fn render_index(defaults: &GenerationDefaults) -> String {
    INDEX_HTML
        .replace("{{TEMPERATURE}}", &defaults.temperature.to_string())
        .replace("{{MIN_TEMPERATURE}}", &MIN_TEMPERATURE.to_string())
        .replace("{{MAX_TEMPERATURE}}", &MAX_TEMPERATURE.to_string())
        .replace("{{NUM_BEAMS}}", &defaults.num_beams.to_string())
        .replace("{{MIN_BEAMS}}", &MIN_BEAMS.to_string())
        .replace("{{MAX_BEAMS}}", &MAX_BEAMS.to_string())
        .replace("{{MAX_LENGTH}}", &defaults.max_length.to_string())
        .replace("{{DO_SAMPLE}}", &defaults.do_sample.to_string())
}

async fn index<M>(State(state): State<AppState<M>>) -> Html<String> {
    Html(render_index(&state.defaults))
}

async fn health<M>(State(state): State<AppState<M>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.model_name.clone(),
    })
}

async fn summarize<M: Seq2SeqModel + 'static>(
    State(state): State<AppState<M>>,
    Json(form): Json<SummaryForm>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let request = form.into_request(&state.defaults);
    // Checked here as well so a blank submit never waits on a running generation.
    request.validate()?;

    let summarizer = Arc::clone(&state.summarizer);
    let response = tokio::task::spawn_blocking(move || {
        // A panic mid-generation leaves no partial state behind, so a poisoned
        // lock still holds a usable model.
        let mut summarizer = summarizer.lock().unwrap_or_else(|poisoned| {
            log::warn!("Recovering summarizer after a panicked generation");
            PoisonError::into_inner(poisoned)
        });
        summarizer.summarize(&request)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("generation task failed: {}", e)))?;

    match response {
        Ok(summary) => Ok(Json(summary)),
        Err(err) => {
            if let SummarizeError::Model(e) = &err {
                log::error!("Generation failed: {:#}", e);
            }
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::GenerationParams;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns the prompt itself, cut to `max_length`, as the summary.
    struct EchoModel {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Seq2SeqModel for EchoModel {
        fn encode(&self, prompt: &str, _max_tokens: usize) -> Result<Vec<u32>> {
            Ok(prompt.bytes().map(u32::from).collect())
        }
        fn generate(&mut self, input_ids: &[u32], params: &GenerationParams) -> Result<Vec<u32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow!("tensor shape mismatch"));
            }
            Ok(input_ids.iter().copied().take(params.max_length).collect())
        }
        fn decode(&self, ids: &[u32], _skip: bool) -> Result<String> {
            Ok(ids.iter().map(|&b| b as u8 as char).collect())
        }
        fn name(&self) -> &str {
            "echo"
        }
    }

    fn state(fail: bool) -> (AppState<EchoModel>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let model = EchoModel {
            calls: Arc::clone(&calls),
            fail,
        };
        let summarizer = Summarizer::new(model, 512, Some(0));
        (AppState::new(summarizer, GenerationDefaults::default()), calls)
    }

    fn form(text: &str) -> SummaryForm {
        SummaryForm {
            text: text.to_string(),
            ..SummaryForm::default()
        }
    }

    #[tokio::test]
    async fn summarize_returns_summary() {
        let (state, calls) = state(false);
        let Json(resp) = summarize(State(state), Json(form("Cats sleep a lot.")))
            .await
            .unwrap();
        assert_eq!(resp.summary, "summarize: Cats sleep a lot.");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blank_text_is_a_warning_without_generation() {
        let (state, calls) = state(false);
        let err = summarize(State(state), Json(form("   \n"))).await.unwrap_err();
        assert!(
            matches!(&err, ApiError::Warning(msg) if msg == "Please enter some text to summarize.")
        );
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn out_of_range_slider_is_bad_request() {
        let (state, calls) = state(false);
        let mut f = form("text");
        f.num_beams = Some(0);
        let err = summarize(State(state), Json(f)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn model_failure_is_internal_error() {
        let (state, calls) = state(true);
        let err = summarize(State(state), Json(form("text"))).await.unwrap_err();
        assert!(matches!(&err, ApiError::Internal(msg) if msg.contains("tensor shape mismatch")));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn poisoned_lock_keeps_serving() {
        let (state, calls) = state(false);
        let shared = Arc::clone(&state.summarizer);
        let panicked = std::thread::spawn(move || {
            let _guard = shared.lock().unwrap();
            panic!("generation panicked");
        })
        .join();
        assert!(panicked.is_err());
        assert!(state.summarizer.is_poisoned());

        let Json(resp) = summarize(State(state), Json(form("Still here.")))
            .await
            .unwrap();
        assert_eq!(resp.summary, "summarize: Still here.");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn health_reports_model() {
        let (state, _) = state(false);
        let Json(body) = health(State(state)).await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.model, "echo");
    }

    #[test]
    fn form_defaults_come_from_settings() {
        let defaults = GenerationDefaults {
            max_length: 80,
            temperature: 0.2,
            num_beams: 3,
            do_sample: false,
        };
        let req: SummaryForm =
            serde_json::from_str(r#"{"text": "x", "temperature": 0.9}"#).unwrap();
        let req = req.into_request(&defaults);
        assert_eq!(req.temperature, 0.9);
        assert_eq!(req.num_beams, 3);
        assert_eq!(req.max_length, 80);
        assert!(!req.do_sample);
    }

    #[test]
    fn page_has_controls_with_defaults() {
        let html = render_index(&GenerationDefaults::default());
        assert!(!html.contains("{{"));
        assert!(html.contains("Text Summarizer"));
        assert!(html.contains(
            r#"id="temperature" type="range" min="0" max="1" step="0.01" value="0.7""#
        ));
        assert!(html.contains(
            r#"id="num-beams" type="range" min="1" max="10" step="1" value="4""#
        ));
        assert!(html.contains("Copy Summary"));
    }
}
