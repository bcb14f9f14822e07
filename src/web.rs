use crate::{AppContext, Artifact, CorpusStatus, GenerationOutcome, Match, SearchOptions, Slide};
use askama::Html as HtmlEscaper;
use askama::{MarkupDisplay, Template};
use axum::{
    Form, Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use markdown::{Options as MarkdownOptions, to_html_with_options};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::info;

type SharedState = Arc<AppState>;
type SafeJson = MarkupDisplay<HtmlEscaper, String>;
const MAX_API_LIMIT: usize = 1000;

pub struct AppState {
    pub ctx: Arc<AppContext>,
    pub theme: WebTheme,
    pub base_url: String,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum WebTheme {
    #[default]
    Tailwind,
    Bootstrap,
}

impl fmt::Display for WebTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebTheme::Tailwind => write!(f, "tailwind"),
            WebTheme::Bootstrap => write!(f, "bootstrap"),
        }
    }
}

impl std::str::FromStr for WebTheme {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "tailwind" => Ok(WebTheme::Tailwind),
            "bootstrap" => Ok(WebTheme::Bootstrap),
            other => Err(format!("unknown theme {other:?} (expected tailwind or bootstrap)")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Chrome {
    use_tailwind: bool,
    use_bootstrap: bool,
    body_class: &'static str,
    main_class: &'static str,
    card_class: &'static str,
    eyebrow_class: &'static str,
    headline_class: &'static str,
    lede_class: &'static str,
    button_class: &'static str,
    input_class: &'static str,
    panel_class: &'static str,
    alert_class: &'static str,
    info_class: &'static str,
}

impl Chrome {
    fn new(theme: WebTheme) -> Self {
        match theme {
            WebTheme::Tailwind => Self {
                use_tailwind: true,
                use_bootstrap: false,
                body_class: "bg-slate-50 text-slate-900",
                main_class: "min-h-screen flex flex-col items-center justify-start py-10 px-4",
                card_class: "max-w-5xl w-full space-y-6",
                eyebrow_class: "uppercase tracking-wide text-sm text-slate-500",
                headline_class: "text-4xl font-extrabold tracking-tight",
                lede_class: "text-lg text-slate-600",
                button_class: "inline-flex items-center rounded-md bg-slate-900 px-4 py-2 text-white font-semibold shadow hover:bg-slate-800 transition-colors",
                input_class: "w-full rounded-md border border-slate-300 px-3 py-2",
                panel_class: "bg-white shadow rounded p-4",
                alert_class: "rounded-md bg-red-50 border border-red-200 text-red-800 p-4",
                info_class: "rounded-md bg-sky-50 border border-sky-200 text-sky-800 p-4",
            },
            WebTheme::Bootstrap => Self {
                use_tailwind: false,
                use_bootstrap: true,
                body_class: "bg-light text-dark",
                main_class: "container py-5",
                card_class: "mx-auto col-lg-10",
                eyebrow_class: "text-uppercase text-muted mb-2",
                headline_class: "display-5 fw-bold",
                lede_class: "lead mb-4",
                button_class: "btn btn-primary btn-lg px-4 py-2",
                input_class: "form-control",
                panel_class: "card card-body mb-3",
                alert_class: "alert alert-danger",
                info_class: "alert alert-info",
            },
        }
    }
}

#[derive(Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub theme: WebTheme,
    pub base_url: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            theme: WebTheme::default(),
            base_url: "http://127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum WebError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub async fn serve(ctx: Arc<AppContext>, config: WebConfig) -> Result<(), WebError> {
    let state = Arc::new(AppState {
        ctx,
        theme: config.theme,
        base_url: config.base_url.clone(),
    });
    let router = build_router(state);
    info!(
        %config.addr,
        theme = ?config.theme,
        base = %config.base_url,
        "Binding HTTP listener"
    );
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/generate", post(generate_html))
        .route("/api/search", get(api_search))
        .route("/api/generate", post(api_generate))
        .route("/healthz", get(health))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<usize>,
    /// Checkbox value (`on`) from the form, or `true`/`false` from the API.
    ignore_case: Option<String>,
}

impl SearchParams {
    fn keyword(&self) -> &str {
        self.q.as_deref().map(str::trim).unwrap_or_default()
    }

    fn case_insensitive(&self) -> bool {
        self.ignore_case
            .as_deref()
            .is_some_and(|v| matches!(v, "on" | "true" | "1" | "yes"))
    }

    fn options(&self, ctx: &AppContext, highlight: bool) -> SearchOptions {
        let mut options = ctx.settings().search_options();
        if let Some(limit) = self.limit {
            options.limit = limit.clamp(1, MAX_API_LIMIT);
        }
        options.case_insensitive = self.case_insensitive();
        options.highlight = highlight;
        options
    }
}

#[derive(Debug, Deserialize)]
struct GenerateParams {
    q: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SearchResponsePayload {
    query: String,
    limit: usize,
    case_insensitive: bool,
    results: Vec<Match>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GenerateResponsePayload {
    term: String,
    model: String,
    passages: Vec<Match>,
    outcome: GenerationOutcome,
    artifact: Option<Artifact>,
}

#[derive(Debug, Clone)]
struct HitView {
    line_number: usize,
    html: String,
    reference: Option<String>,
}

impl From<Match> for HitView {
    fn from(hit: Match) -> Self {
        let html = hit
            .highlighted
            .unwrap_or_else(|| crate::search::escape_html(&hit.text));
        Self {
            line_number: hit.line_number,
            html,
            reference: hit.reference,
        }
    }
}

/// Message shown instead of results when the corpus cannot be searched.
fn corpus_problem(status: &CorpusStatus) -> Option<String> {
    match status {
        CorpusStatus::Ready { .. } => None,
        CorpusStatus::Missing { searched } => {
            let names = searched
                .iter()
                .filter_map(|p| p.file_name())
                .map(|name| name.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(" 또는 ");
            Some(format!(
                "📂 data 폴더에 {names} 파일이 없습니다. 하나를 올려주세요."
            ))
        }
        CorpusStatus::Unreadable { path } => Some(format!(
            "⚠️ {} 파일을 읽었지만 내용이 비어 있습니다. 인코딩(utf-8, euc-kr) 확인이 필요합니다.",
            path.display()
        )),
    }
}

async fn home(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    let ctx = &state.ctx;
    let keyword = params.keyword().to_string();
    let problem = corpus_problem(ctx.corpus_status());
    let hits: Vec<HitView> = if problem.is_none() && !keyword.is_empty() {
        ctx.search(&keyword, &params.options(ctx, true))
            .into_iter()
            .map(HitView::from)
            .collect()
    } else {
        Vec::new()
    };
    let template = HomeTemplate {
        chrome: Chrome::new(state.theme),
        json_ld: MarkupDisplay::new_safe(website_json_ld(&state.base_url), HtmlEscaper),
        keyword: &keyword,
        ignore_case: params.case_insensitive(),
        problem,
        searched: !keyword.is_empty(),
        hits,
        preview: ctx.preview(),
        version: env!("CARGO_PKG_VERSION"),
    };
    Html(
        template
            .render()
            .unwrap_or_else(|err| render_error_page(state.theme, err.to_string())),
    )
}

async fn generate_html(
    State(state): State<SharedState>,
    Form(params): Form<GenerateParams>,
) -> impl IntoResponse {
    let term = params.q.unwrap_or_default();
    let report = state.ctx.generate_report(&term).await;
    let artifact = report.artifact();
    let (body_html, slides) = match (&report.outcome, artifact) {
        (GenerationOutcome::Generated(_), Some(artifact)) if !artifact.slides.is_empty() => (
            render_markdown_str(&artifact.report).unwrap_or_default(),
            artifact.slides,
        ),
        (GenerationOutcome::Generated(text), _) => {
            (render_markdown_str(text).unwrap_or_default(), Vec::new())
        }
        (GenerationOutcome::Failed(_), _) => (String::new(), Vec::new()),
    };
    let error = match &report.outcome {
        GenerationOutcome::Failed(message) => Some(message.clone()),
        GenerationOutcome::Generated(_) => None,
    };
    let template = ReportTemplate {
        chrome: Chrome::new(state.theme),
        term: &report.term,
        back_link: format!("/?q={}", encode_component(&report.term)),
        passage_count: report.passages.len(),
        model: state.ctx.generator().model(),
        error,
        body_html,
        slides,
    };
    Html(
        template
            .render()
            .unwrap_or_else(|err| render_error_page(state.theme, err.to_string())),
    )
}

async fn api_search(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponsePayload>, ApiError> {
    let ctx = &state.ctx;
    if let Some(problem) = corpus_problem(ctx.corpus_status()) {
        return Err(ApiError::unavailable(problem));
    }
    let options = params.options(ctx, false);
    let query = params.keyword().to_string();
    let results = ctx.search(&query, &options);
    Ok(Json(SearchResponsePayload {
        query,
        limit: options.limit,
        case_insensitive: options.case_insensitive,
        results,
    }))
}

async fn api_generate(
    State(state): State<SharedState>,
    Json(params): Json<GenerateParams>,
) -> Result<Json<GenerateResponsePayload>, ApiError> {
    let term = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::bad_request("Field `q` is required"))?;
    let report = state.ctx.generate_report(term).await;
    let artifact = report.artifact();
    Ok(Json(GenerateResponsePayload {
        term: report.term,
        model: state.ctx.generator().model().to_string(),
        passages: report.passages,
        outcome: report.outcome,
        artifact,
    }))
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "urantia-study-web",
        "corpus_ready": state.ctx.corpus_status().is_ready(),
        "corpus_lines": state.ctx.corpus().len(),
    }))
}

fn render_error_page(theme: WebTheme, message: impl Into<String>) -> String {
    let chrome = Chrome::new(theme);
    let (css_tag, js_tag) = match theme {
        WebTheme::Tailwind => (
            r#"<script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>"#,
            "",
        ),
        WebTheme::Bootstrap => (
            r#"<link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.8/dist/css/bootstrap.min.css" rel="stylesheet" integrity="sha384-sRIl4kxILFvY47J16cr9ZwB07vP4J8+LH7qKQnuqkuIAvNWLzeN8tE5YBujZqJLB" crossorigin="anonymous">"#,
            r#"<script src="https://cdn.jsdelivr.net/npm/bootstrap@5.3.8/dist/js/bootstrap.bundle.min.js" integrity="sha384-FKyoEForCGlyvwx9Hj09JcYn3nv7wiPVlz7YYwJrWVcXK/BmnVDxM+D2scQbITxI" crossorigin="anonymous"></script>"#,
        ),
    };
    let message = crate::search::escape_html(&message.into());
    format!(
        r#"<!DOCTYPE html>
<html lang="ko">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>유란시아 주제 연구 • 오류</title>
    {css_tag}
    {js_tag}
  </head>
  <body class="{body_class}">
    <main class="{main_class}">
      <div class="{card_class}">
        <h1 class="{headline_class}">문제가 발생했습니다</h1>
        <p class="{lede_class}">{message}</p>
        <a href="/" class="{button_class}">처음으로</a>
      </div>
    </main>
  </body>
</html>"#,
        css_tag = css_tag,
        js_tag = js_tag,
        body_class = chrome.body_class,
        main_class = chrome.main_class,
        card_class = chrome.card_class,
        headline_class = chrome.headline_class,
        lede_class = chrome.lede_class,
        button_class = chrome.button_class,
        message = message,
    )
}

fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

fn website_json_ld(base_url: &str) -> String {
    serde_json::to_string_pretty(&json!({
        "@context": "https://schema.org",
        "@type": "WebSite",
        "url": base_url,
        "potentialAction": {
            "@type": "SearchAction",
            "target": format!("{}/?q={{search_term_string}}", base_url),
            "query-input": "required name=search_term_string"
        }
    }))
    .unwrap_or_else(|_| "{}".to_string())
}

fn markdown_options() -> MarkdownOptions {
    // Model output is untrusted, so raw HTML stays escaped.
    MarkdownOptions::gfm()
}

fn render_markdown_str(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let html = to_html_with_options(trimmed, &markdown_options())
        .unwrap_or_else(|_| crate::search::escape_html(trimmed));
    Some(html)
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="ko">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>유란시아 주제 연구 – 한국어판</title>
    {% if chrome.use_tailwind %}
    <script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>
    {% endif %}
    {% if chrome.use_bootstrap %}
    <link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.8/dist/css/bootstrap.min.css" rel="stylesheet" integrity="sha384-sRIl4kxILFvY47J16cr9ZwB07vP4J8+LH7qKQnuqkuIAvNWLzeN8tE5YBujZqJLB" crossorigin="anonymous">
    <script src="https://cdn.jsdelivr.net/npm/bootstrap@5.3.8/dist/js/bootstrap.bundle.min.js" integrity="sha384-FKyoEForCGlyvwx9Hj09JcYn3nv7wiPVlz7YYwJrWVcXK/BmnVDxM+D2scQbITxI" crossorigin="anonymous"></script>
    {% endif %}
    <script type="application/ld+json">
    {{ json_ld }}
    </script>
  </head>
  <body class="{{ chrome.body_class }}">
    <main class="{{ chrome.main_class }}">
      <div class="{{ chrome.card_class }} space-y-6">
        <div>
          <p class="{{ chrome.eyebrow_class }}">Urantia Theme Study v{{ version }}</p>
          <h1 class="{{ chrome.headline_class }}">📘 유란시아 주제 연구</h1>
          <p class="{{ chrome.lede_class }}">입력한 주제를 유란시아서 본문에서 찾아서 AI가 <strong>신학적 보고서</strong>와 <strong>5장짜리 슬라이드 개요</strong>를 만들어 줍니다.</p>
        </div>

        <section id="search">
          <h2 class="text-xl font-semibold mb-2">1️⃣ 주제 입력</h2>
          <form method="get" action="/" class="{{ chrome.panel_class }} space-y-3">
            <input type="text" name="q" value="{{ keyword }}" placeholder="예: 신성, 최극자, 조율자, 미가엘, 상승, 신앙" class="{{ chrome.input_class }}" />
            <label class="text-sm text-slate-600">
              <input type="checkbox" name="ignore_case" {% if ignore_case %}checked{% endif %} /> 대소문자 무시
            </label>
            <button type="submit" class="{{ chrome.button_class }}">검색</button>
          </form>
        </section>

        <section id="passages">
          <h2 class="text-xl font-semibold mb-2">2️⃣ 관련 유란시아서 구절</h2>
          {% match problem %}
          {% when Some with (message) %}
          <div class="{{ chrome.alert_class }}">{{ message }}</div>
          {% when None %}
            {% if searched %}
              {% if hits.len() == 0 %}
              <div class="{{ chrome.info_class }}">관련 구절이 없습니다. 다른 단어나 주제를 입력해보세요.</div>
              {% else %}
              <p class="text-sm text-slate-500">{{ hits.len() }}개 구절</p>
              <ol class="space-y-2 list-none pl-0">
                {% for hit in hits %}
                <li class="{{ chrome.panel_class }}">
                  <span class="font-mono text-slate-500">{{ hit.line_number }}:</span>
                  {% match hit.reference %}
                  {% when Some with (reference) %}
                  <span class="px-2 py-0.5 rounded-full bg-slate-200 text-xs">{{ reference }}</span>
                  {% when None %}
                  {% endmatch %}
                  <span>{{ hit.html|safe }}</span>
                </li>
                {% endfor %}
              </ol>
              {% endif %}
            {% endif %}
            <details class="mt-4">
              <summary class="text-sm text-slate-500">📄 파일 미리보기 (처음 {{ preview.len() }}줄)</summary>
              <pre class="text-xs whitespace-pre-wrap">{% for line in preview %}{{ line }}
{% endfor %}</pre>
            </details>
          {% endmatch %}
        </section>

        <section id="generate">
          <h2 class="text-xl font-semibold mb-2">3️⃣ AI 보고서 + 슬라이드 생성</h2>
          <form method="post" action="/generate" class="{{ chrome.panel_class }}">
            <input type="hidden" name="q" value="{{ keyword }}" />
            <button type="submit" class="{{ chrome.button_class }}">✨ 보고서 및 슬라이드 생성</button>
          </form>
          <p class="text-sm text-slate-500">주제를 입력하고 버튼을 누르면 AI가 내용을 만들어 줍니다.</p>
        </section>
      </div>
    </main>
  </body>
</html>"#,
    ext = "html"
)]
struct HomeTemplate<'a> {
    chrome: Chrome,
    json_ld: SafeJson,
    keyword: &'a str,
    ignore_case: bool,
    problem: Option<String>,
    searched: bool,
    hits: Vec<HitView>,
    preview: &'a [String],
    version: &'static str,
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="ko">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>유란시아 주제 연구 • {{ term }}</title>
    {% if chrome.use_tailwind %}
    <script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>
    {% endif %}
    {% if chrome.use_bootstrap %}
    <link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.8/dist/css/bootstrap.min.css" rel="stylesheet" integrity="sha384-sRIl4kxILFvY47J16cr9ZwB07vP4J8+LH7qKQnuqkuIAvNWLzeN8tE5YBujZqJLB" crossorigin="anonymous">
    <script src="https://cdn.jsdelivr.net/npm/bootstrap@5.3.8/dist/js/bootstrap.bundle.min.js" integrity="sha384-FKyoEForCGlyvwx9Hj09JcYn3nv7wiPVlz7YYwJrWVcXK/BmnVDxM+D2scQbITxI" crossorigin="anonymous"></script>
    {% endif %}
  </head>
  <body class="{{ chrome.body_class }}">
    <main class="{{ chrome.main_class }}">
      <div class="{{ chrome.card_class }} space-y-6">
        <div>
          <p class="{{ chrome.eyebrow_class }}">{{ model }} • 참고 구절 {{ passage_count }}개</p>
          <h1 class="{{ chrome.headline_class }}">“{{ term }}” 보고서</h1>
          <a href="{{ back_link }}" class="{{ chrome.button_class }}">검색으로 돌아가기</a>
        </div>
        {% match error %}
        {% when Some with (message) %}
        <div class="{{ chrome.alert_class }}">{{ message }}</div>
        {% when None %}
        <section id="report">
          <div class="{{ chrome.panel_class }} prose prose-slate max-w-none">{{ body_html|safe }}</div>
        </section>
        {% if slides.len() > 0 %}
        <section id="slides" class="space-y-4">
          <h2 class="text-xl font-semibold mb-2">슬라이드 ({{ slides.len() }})</h2>
          {% for slide in slides %}
          <article class="{{ chrome.panel_class }}">
            <h3 class="font-semibold">슬라이드 {{ slide.number }}: {{ slide.title }}</h3>
            <ul class="list-disc pl-6">
              {% for bullet in slide.bullets %}
              <li>{{ bullet }}</li>
              {% endfor %}
            </ul>
            {% match slide.notes %}
            {% when Some with (notes) %}
            <p class="text-sm text-slate-600 mt-2"><strong>발표자 노트:</strong> {{ notes }}</p>
            {% when None %}
            {% endmatch %}
          </article>
          {% endfor %}
        </section>
        {% endif %}
        {% endmatch %}
      </div>
    </main>
  </body>
</html>"#,
    ext = "html"
)]
struct ReportTemplate<'a> {
    chrome: Chrome,
    term: &'a str,
    back_link: String,
    passage_count: usize,
    model: &'a str,
    error: Option<String>,
    body_html: String,
    slides: Vec<Slide>,
}
