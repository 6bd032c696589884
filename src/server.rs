//! HTTP front-end.
//!
//! Serves the submission form on `/`, a static `/about` page, and JSON
//! `/health` and `/stats` endpoints. Inference runs on the blocking pool
//! under a timeout so a slow model cannot stall the runtime.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::rejection::FormRejection;
use axum::extract::{ConnectInfo, Form, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use eyre::Result;
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::render;
use crate::service::{Analysis, ToxicityService};
use crate::verdict::Label;
use crate::AppConfig;

/// Above this many tracked IPs the limiter map is reset.
const MAX_TRACKED_IPS: usize = 10_000;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Form submissions per minute per IP (0 = no limit)
    pub rate_limit_rpm: u32,
    /// Upper bound on a single inference
    pub inference_timeout: Duration,
    /// Maximum inferences running on the blocking pool at once
    pub max_concurrent_inferences: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            rate_limit_rpm: 60,
            inference_timeout: Duration::from_secs(10),
            max_concurrent_inferences: 4,
        }
    }
}

impl ServerConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            bind_addr: config.bind_addr()?,
            rate_limit_rpm: config.rate_limit_rpm(),
            inference_timeout: config.inference_timeout(),
            max_concurrent_inferences: config.max_concurrent_inferences(),
        })
    }
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct SubmitForm {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model_hash: String,
    pub vocab_size: usize,
    pub replacements: usize,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub uptime_seconds: u64,
    pub model_hash: String,
    pub requests: RequestStats,
    pub verdicts: VerdictStats,
    pub endpoints: EndpointStats,
}

#[derive(Debug, Serialize)]
pub struct RequestStats {
    pub total: u64,
    pub errors: u64,
    pub rate_limited: u64,
}

#[derive(Debug, Serialize)]
pub struct VerdictStats {
    pub toxic: u64,
    pub not_toxic: u64,
    pub blank: u64,
}

#[derive(Debug, Serialize)]
pub struct EndpointStats {
    pub index: u64,
    pub about: u64,
    pub stats: u64,
}

// ---------------------------------------------------------------------------
// Usage metrics
// ---------------------------------------------------------------------------

/// Atomic usage counters for the server.
#[derive(Default)]
pub struct UsageMetrics {
    pub total_requests: AtomicU64,
    pub total_errors: AtomicU64,
    pub rate_limited: AtomicU64,

    pub toxic: AtomicU64,
    pub not_toxic: AtomicU64,
    pub blank: AtomicU64,

    pub ep_index: AtomicU64,
    pub ep_about: AtomicU64,
    pub ep_stats: AtomicU64,
}

impl UsageMetrics {
    /// Record the outcome of one form submission.
    fn record(&self, analysis: &Analysis) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        match analysis {
            Analysis::Blank => {
                self.blank.fetch_add(1, Ordering::Relaxed);
            }
            Analysis::Scored { verdict, .. } => match verdict.label {
                Label::Toxic => {
                    self.toxic.fetch_add(1, Ordering::Relaxed);
                }
                Label::NotToxic => {
                    self.not_toxic.fetch_add(1, Ordering::Relaxed);
                }
            },
            Analysis::Failed { .. } => {
                self.total_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn record_rate_limited(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Server state
// ---------------------------------------------------------------------------

type IpRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub struct ServerState {
    pub config: ServerConfig,
    pub service: Arc<ToxicityService>,
    pub start_time: Instant,
    /// Held by each running inference, including ones that outlived their timeout
    pub inference_permits: Arc<Semaphore>,
    /// Per-IP rate limiters (lazy-initialized)
    pub rate_limiters: Mutex<HashMap<IpAddr, Arc<IpRateLimiter>>>,
    pub usage: UsageMetrics,
}

impl ServerState {
    pub fn new(config: ServerConfig, service: ToxicityService) -> Self {
        let permits = config.max_concurrent_inferences.max(1);
        Self {
            config,
            service: Arc::new(service),
            start_time: Instant::now(),
            inference_permits: Arc::new(Semaphore::new(permits)),
            rate_limiters: Mutex::new(HashMap::new()),
            usage: UsageMetrics::default(),
        }
    }

    /// Get or create a rate limiter for the given IP address.
    pub async fn get_rate_limiter(&self, ip: IpAddr) -> Option<Arc<IpRateLimiter>> {
        let rpm = NonZeroU32::new(self.config.rate_limit_rpm)?;

        let mut limiters = self.rate_limiters.lock().await;
        if let Some(limiter) = limiters.get(&ip) {
            return Some(Arc::clone(limiter));
        }

        let limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));
        if limiters.len() >= MAX_TRACKED_IPS {
            warn!(tracked = limiters.len(), "rate limiter map full, clearing");
            limiters.clear();
        }
        limiters.insert(ip, Arc::clone(&limiter));
        Some(limiter)
    }

    /// Analyze a submission off the async runtime, bounded by the configured timeout.
    ///
    /// A timed-out inference cannot be cancelled and keeps running on the
    /// blocking pool, still holding its permit, so at most
    /// `max_concurrent_inferences` model calls are ever in flight. Waiting
    /// for a permit counts against the timeout.
    pub async fn analyze(&self, text: String) -> Analysis {
        if text.trim().is_empty() {
            return Analysis::Blank;
        }

        let service = Arc::clone(&self.service);
        let permits = Arc::clone(&self.inference_permits);
        let run = async move {
            let permit = permits.acquire_owned().await?;
            let task = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                service.analyze(&text)
            });
            Ok::<_, eyre::Report>(task.await?)
        };

        match tokio::time::timeout(self.config.inference_timeout, run).await {
            Ok(Ok(analysis)) => analysis,
            Ok(Err(e)) => {
                warn!(error = %e, "inference task aborted");
                Analysis::Failed {
                    reason: format!("inference task aborted: {e}"),
                }
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.inference_timeout.as_millis() as u64,
                    available_permits = self.inference_permits.available_permits(),
                    "inference timed out, the model call keeps its slot until it returns"
                );
                Analysis::Failed {
                    reason: "inference timed out".to_string(),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP server
// ---------------------------------------------------------------------------

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(index_handler).post(submit_handler))
        .route("/about", get(about_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
}

/// Serve on an already-bound listener until the process exits.
pub async fn serve(listener: TcpListener, state: Arc<ServerState>) -> Result<()> {
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

pub async fn run_server(config: ServerConfig, service: ToxicityService) -> Result<()> {
    let bind_addr = config.bind_addr;
    let rate_limit_rpm = config.rate_limit_rpm;
    let state = Arc::new(ServerState::new(config, service));

    let listener = TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, model_hash = %state.service.model_hash(), "tonecheck listening");
    info!("endpoints: GET|POST /, GET /about, GET /health, GET /stats");
    if rate_limit_rpm > 0 {
        info!("rate limit: {} submissions/minute per IP", rate_limit_rpm);
    } else {
        info!("rate limit: disabled");
    }

    serve(listener, state).await
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn index_handler(State(state): State<Arc<ServerState>>) -> Html<String> {
    state.usage.ep_index.fetch_add(1, Ordering::Relaxed);
    Html(render::index_page("", None))
}

async fn submit_handler(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    form: Result<Form<SubmitForm>, FormRejection>,
) -> (StatusCode, Html<String>) {
    state.usage.ep_index.fetch_add(1, Ordering::Relaxed);

    // A body that is absent, not urlencoded or undecodable counts as empty text.
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            debug!(ip = %addr.ip(), %rejection, "unreadable form body, treating as empty");
            SubmitForm::default()
        }
    };

    if let Some(limiter) = state.get_rate_limiter(addr.ip()).await {
        if limiter.check().is_err() {
            state.usage.record_rate_limited();
            warn!(ip = %addr.ip(), "rate limit exceeded");
            let notice = format!(
                "Rate limit exceeded. Maximum {} requests per minute.",
                state.config.rate_limit_rpm
            );
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Html(render::index_page_with_notice(&form.text, Some(&notice), None)),
            );
        }
    }

    let start = Instant::now();
    let analysis = state.analyze(form.text.clone()).await;
    state.usage.record(&analysis);
    debug!(
        ip = %addr.ip(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        result = %analysis.message(),
        "handled submission"
    );

    (
        StatusCode::OK,
        Html(render::index_page(&form.text, Some(&analysis))),
    )
}

async fn about_handler(State(state): State<Arc<ServerState>>) -> Html<String> {
    state.usage.ep_about.fetch_add(1, Ordering::Relaxed);
    Html(render::about_page())
}

async fn health_handler(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_hash: state.service.model_hash(),
        vocab_size: state.service.vocab_size(),
        replacements: state.service.table().len(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

async fn stats_handler(State(state): State<Arc<ServerState>>) -> Json<StatsResponse> {
    state.usage.ep_stats.fetch_add(1, Ordering::Relaxed);
    let usage = &state.usage;

    Json(StatsResponse {
        uptime_seconds: state.start_time.elapsed().as_secs(),
        model_hash: state.service.model_hash(),
        requests: RequestStats {
            total: usage.total_requests.load(Ordering::Relaxed),
            errors: usage.total_errors.load(Ordering::Relaxed),
            rate_limited: usage.rate_limited.load(Ordering::Relaxed),
        },
        verdicts: VerdictStats {
            toxic: usage.toxic.load(Ordering::Relaxed),
            not_toxic: usage.not_toxic.load(Ordering::Relaxed),
            blank: usage.blank.load(Ordering::Relaxed),
        },
        endpoints: EndpointStats {
            index: usage.ep_index.load(Ordering::Relaxed),
            about: usage.ep_about.load(Ordering::Relaxed),
            stats: usage.ep_stats.load(Ordering::Relaxed),
        },
    })
}
