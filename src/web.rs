use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Form, Query, State};
use axum::http::{Request, StatusCode};
use axum::middleware::{Next, from_fn};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::level::{self, Mode};
use crate::review;
use crate::session::{QuizState, Session};
use crate::store::{FileStore, Store};
use crate::term::Term;
use crate::tutor::{GradeRequest, OpenAiTutor, Tutor};

// -- Static assets embedded at compile time --

const BASE_CSS: &str = include_str!("static/style.css");
const QUIZ_JS: &str = include_str!("static/quiz.js");

// -- App state --

struct ServerState<S: Store> {
    session: Session<S>,
    /// One-shot message shown on the next rendered page.
    notice: Option<String>,
}

pub struct AppState<S: Store, T> {
    inner: Mutex<ServerState<S>>,
    tutor: T,
}

type SharedState<S, T> = Arc<AppState<S, T>>;

impl<S: Store, T> AppState<S, T> {
    pub fn new(session: Session<S>, tutor: T) -> SharedState<S, T> {
        Arc::new(AppState {
            inner: Mutex::new(ServerState {
                session,
                notice: None,
            }),
            tutor,
        })
    }
}

fn notice_for(e: &Error) -> String {
    match e {
        Error::Service(msg) => format!("The tutor service failed: {msg}. Please try again."),
        other => other.to_string(),
    }
}

// -- HTML helpers --

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} · kioku</title>
<style>body{{background:#1e1e1e;color:#d4d4d4}}</style>
<script src="https://cdn.tailwindcss.com"></script>
<style>{base_css}</style>
</head>
<body class="bg-[#1e1e1e] text-[#d4d4d4] font-sans antialiased h-screen">
{body}
<script>{js}</script>
</body>
</html>"#,
        title = html_escape(title),
        body = body,
        base_css = BASE_CSS,
        js = QUIZ_JS,
    )
}

fn sidebar_html(active: &str, due: usize) -> String {
    let mut items = String::new();
    for (href, label) in [
        ("/", "Terms"),
        ("/quiz", "Quiz"),
        ("/dictionary", "Dictionary"),
        ("/history", "History"),
    ] {
        let cls = if href == active {
            " bg-[#333] !text-[#e0e0e0]"
        } else {
            ""
        };
        let badge = if href == "/quiz" && due > 0 {
            format!(
                r#"<span class="text-[0.7rem] bg-[#444] text-[#ccc] px-1.5 py-0.5 rounded-full min-w-5 text-center">{due}</span>"#
            )
        } else {
            String::new()
        };
        items.push_str(&format!(
            r#"<li><a href="{href}" class="flex items-center justify-between px-4 py-1.5 text-[#999] text-sm no-underline hover:bg-[#2a2a2a] hover:!text-[#d4d4d4]{cls}">{label}{badge}</a></li>"#,
        ));
    }
    format!(
        r#"<div class="w-56 shrink-0 bg-[#252525] border-r border-[#333] py-5 overflow-y-auto flex flex-col">
<div class="px-4 pb-4 text-[0.95rem] font-semibold text-[#e0e0e0]"><a href="/" class="!text-inherit no-underline">kioku</a></div>
<nav><ul class="list-none m-0 p-0">{items}</ul></nav>
<div class="flex-1"></div>
</div>"#,
    )
}

fn notice_html(notice: Option<String>) -> String {
    notice.map_or(String::new(), |n| {
        format!(
            r#"<div class="notice rounded-md px-4 py-2.5 mb-4 text-sm">{}</div>"#,
            html_escape(&n)
        )
    })
}

fn level_badge(level: u8) -> String {
    format!(
        r#"<span class="level-badge" style="background:{}">{}</span>"#,
        level::color(level),
        html_escape(level::label(level)),
    )
}

const BTN_PRIMARY: &str = "inline-flex items-center gap-1.5 px-3.5 py-2 rounded-md text-sm font-medium bg-[#4a90d9] !text-white no-underline cursor-pointer hover:bg-[#5a9de6]";

const BTN_SECONDARY: &str = "inline-flex items-center gap-1.5 px-3.5 py-2 rounded-md text-sm font-medium bg-[#383838] !text-[#ccc] border border-[#444] no-underline cursor-pointer hover:bg-[#444] hover:!text-[#e0e0e0]";

const INPUT_CLS: &str = "w-full px-3 py-2.5 border border-[#444] rounded-md text-[0.9rem] bg-[#383838] text-[#e0e0e0] focus:outline-none focus:border-[#6ba3d6]";

fn start_form(mode: Mode, label: &str) -> String {
    format!(
        r#"<form method="post" action="/quiz/start" class="inline"><input type="hidden" name="mode" value="{mode}"><button type="submit" class="{cls}">{label}</button></form>"#,
        cls = if mode == Mode::Levelup {
            BTN_PRIMARY
        } else {
            BTN_SECONDARY
        },
        label = html_escape(label),
    )
}

fn layout(title: &str, active: &str, due: usize, notice: Option<String>, content: &str) -> Html<String> {
    let body = format!(
        r#"<div class="flex h-screen">
{sidebar}
<div class="flex-1 overflow-y-auto min-w-0">
<div class="flex items-center justify-between px-6 py-3 border-b border-[#333] bg-[#232323]">
<div class="text-sm text-[#888]">{title}</div>
</div>
<div class="p-6 max-w-5xl">{notice}{content}</div>
</div>
</div>"#,
        sidebar = sidebar_html(active, due),
        title = html_escape(title),
        notice = notice_html(notice),
        content = content,
    );
    Html(page(title, &body))
}

fn term_tile(term: &Term, now: DateTime<Utc>, with_delete: bool) -> String {
    let delete = if with_delete {
        format!(
            r#"<form method="post" action="/terms/delete" onsubmit="return confirm('Delete this term?')"><input type="hidden" name="name" value="{name}"><button type="submit" class="text-xs text-[#e06c6c] cursor-pointer hover:underline">Delete</button></form>"#,
            name = html_escape(&term.name),
        )
    } else {
        String::new()
    };
    format!(
        r#"<div class="bg-[#2d2d2d] border border-[#3a3a3a] rounded-lg p-4 flex flex-col gap-2">
<div class="flex items-center justify-between gap-2"><h4 class="font-medium text-[#e0e0e0]">{name}</h4>{badge}</div>
<div class="flex items-center gap-2"><div class="progress-bar flex-1"><div class="progress-fill" style="width:{progress}%;background:{color}"></div></div><span class="text-xs text-[#888]">{level}/7</span></div>
<p class="text-sm text-[#aaa] whitespace-pre-wrap">{description}</p>
<div class="flex items-center justify-between text-xs text-[#888]"><span>Next: {status}</span><span>{correct}/{total} correct</span></div>
{delete}
</div>"#,
        name = html_escape(&term.name),
        badge = level_badge(term.level),
        progress = term.progress_percent(),
        color = level::color(term.level),
        level = term.level,
        description = html_escape(&term.description),
        status = review::review_status(term, now),
        correct = term.correct_count,
        total = term.total_attempts,
    )
}

/// Run the decay sweep before a page computes eligibility.
fn refresh<S: Store>(st: &mut ServerState<S>, now: DateTime<Utc>) {
    if let Err(e) = st.session.sweep(now) {
        log::warn!("decay sweep could not be saved: {e}");
        st.notice = Some(notice_for(&e));
    }
}

/// Undoes a pending quiz step when the handler is dropped before the
/// service call completes, e.g. because the client went away.
struct PendingStep<S: Store + 'static, T: Tutor> {
    state: SharedState<S, T>,
    revert: fn(&mut Session<S>),
    armed: bool,
}

impl<S: Store + 'static, T: Tutor> PendingStep<S, T> {
    fn new(state: &SharedState<S, T>, revert: fn(&mut Session<S>)) -> Self {
        PendingStep {
            state: Arc::clone(state),
            revert,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<S: Store + 'static, T: Tutor> Drop for PendingStep<S, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let state = Arc::clone(&self.state);
        let revert = self.revert;
        let undo = async move {
            let mut st = state.inner.lock().await;
            revert(&mut st.session);
            st.notice = Some("The request was cancelled before the tutor answered.".to_string());
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                log::warn!("quiz request dropped while waiting on the tutor");
                handle.spawn(undo);
            }
            Err(_) => log::error!("quiz request dropped outside a runtime, state left pending"),
        }
    }
}

// -- Route handlers --

async fn index<S: Store + 'static, T: Tutor>(State(state): State<SharedState<S, T>>) -> Html<String> {
    let mut st = state.inner.lock().await;
    let now = Utc::now();
    refresh(&mut st, now);

    let due = st.session.due_terms(now).len();
    let mut tiles = String::new();
    if st.session.terms().is_empty() {
        tiles.push_str(r#"<p class="text-center text-[#666] py-12">No terms registered yet.</p>"#);
    } else {
        tiles.push_str(r#"<div class="grid grid-cols-[repeat(auto-fill,minmax(260px,1fr))] gap-4">"#);
        for term in st.session.terms() {
            tiles.push_str(&term_tile(term, now, true));
        }
        tiles.push_str("</div>");
    }

    let mut summary = String::new();
    for s in review::level_summaries(st.session.terms()) {
        if s.total > 0 {
            summary.push_str(&format!(
                r#"<span class="flex items-center gap-1.5">{badge}<span class="text-[#888]">{total}</span></span>"#,
                badge = level_badge(s.level),
                total = s.total,
            ));
        }
    }

    let content = format!(
        r#"<form method="post" action="/terms" class="bg-[#2a2a2a] rounded-lg p-4 mb-6 flex flex-col gap-3">
<h2 class="text-sm font-semibold text-[#e0e0e0]">Register a term</h2>
<input name="name" placeholder="Term" class="{input_cls}">
<textarea name="description" rows="3" placeholder="Description (the model answer)" class="{input_cls}"></textarea>
<div><button type="submit" class="{btn}">Add term</button></div>
</form>
<div class="flex flex-wrap gap-3 mb-4 text-sm">{summary}</div>
{tiles}"#,
        input_cls = INPUT_CLS,
        btn = BTN_PRIMARY,
        summary = summary,
        tiles = tiles,
    );
    let notice = st.notice.take();
    layout("Terms", "/", due, notice, &content)
}

#[derive(Deserialize)]
struct TermForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
}

async fn term_create<S: Store + 'static, T: Tutor>(
    State(state): State<SharedState<S, T>>,
    Form(form): Form<TermForm>,
) -> Redirect {
    let mut st = state.inner.lock().await;
    let notice = match st.session.register(&form.name, &form.description, Utc::now()) {
        Ok(term) => format!("Added \"{}\".", term.name),
        Err(e) => notice_for(&e),
    };
    st.notice = Some(notice);
    Redirect::to("/")
}

#[derive(Deserialize)]
struct DeleteForm {
    #[serde(default)]
    name: String,
}

async fn term_delete<S: Store + 'static, T: Tutor>(
    State(state): State<SharedState<S, T>>,
    Form(form): Form<DeleteForm>,
) -> Redirect {
    let mut st = state.inner.lock().await;
    if let Err(e) = st.session.remove(&form.name) {
        st.notice = Some(notice_for(&e));
    }
    Redirect::to("/")
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

async fn dictionary<S: Store + 'static, T: Tutor>(
    State(state): State<SharedState<S, T>>,
    Query(query): Query<SearchQuery>,
) -> Html<String> {
    let mut st = state.inner.lock().await;
    let now = Utc::now();
    refresh(&mut st, now);
    let due = st.session.due_terms(now).len();

    let found = review::search(st.session.terms(), &query.q);
    let tiles = if found.is_empty() {
        r#"<p class="text-center text-[#666] py-12">No matching terms.</p>"#.to_string()
    } else {
        let mut tiles = String::from(
            r#"<div class="grid grid-cols-[repeat(auto-fill,minmax(260px,1fr))] gap-4">"#,
        );
        for term in found {
            tiles.push_str(&term_tile(term, now, false));
        }
        tiles.push_str("</div>");
        tiles
    };

    let content = format!(
        r#"<form method="get" action="/dictionary" class="flex gap-2 mb-6"><input name="q" value="{q}" placeholder="Search terms and descriptions" class="{input_cls}"><button type="submit" class="{btn}">Search</button></form>
{tiles}"#,
        q = html_escape(&query.q),
        input_cls = INPUT_CLS,
        btn = BTN_SECONDARY,
        tiles = tiles,
    );
    let notice = st.notice.take();
    layout("Dictionary", "/dictionary", due, notice, &content)
}

async fn quiz_page<S: Store + 'static, T: Tutor>(State(state): State<SharedState<S, T>>) -> Html<String> {
    let mut st = state.inner.lock().await;
    let now = Utc::now();
    if !st.session.quiz().is_pending() {
        refresh(&mut st, now);
    }
    let due = st.session.due_terms(now).len();

    let content = match st.session.quiz() {
        QuizState::Idle if st.session.terms().is_empty() => {
            r#"<p class="text-center text-[#666] py-12">Register a term first.</p>"#.to_string()
        }
        QuizState::Idle => {
            let due_text = if due > 0 {
                format!("{due} terms ready for review")
            } else {
                "No terms are ready for review right now".to_string()
            };
            format!(
                r#"<p class="text-sm text-[#888] mb-4">{due_text}</p>
<div class="flex gap-3">{levelup}{practice}</div>
<p class="text-xs text-[#666] mt-4">Level up quizzes due terms and moves their level. Practice quizzes any term and only counts the attempt.</p>"#,
                levelup = start_form(Mode::Levelup, "Level up"),
                practice = start_form(Mode::Practice, "Practice"),
            )
        }
        QuizState::Generating { term_name, .. } => format!(
            r#"<meta http-equiv="refresh" content="2"><p class="text-[#888]">Generating a question about {}…</p>"#,
            html_escape(term_name)
        ),
        QuizState::Answering {
            term_name,
            mode,
            question,
            draft,
        } => {
            let level = st.session.term(term_name).map_or(0, |t| t.level);
            format!(
                r#"<div class="flex items-center gap-2 mb-3 text-sm"><span class="text-[#888] uppercase tracking-wider text-xs">{mode}</span>{badge}<span class="font-medium text-[#e0e0e0]">{name}</span></div>
<div class="bg-[#2d2d2d] border border-[#3a3a3a] rounded-xl px-6 py-6 mb-4 whitespace-pre-wrap text-[#e0e0e0]">{question}</div>
<form method="post" action="/quiz/answer" class="flex flex-col gap-3">
<textarea name="answer" rows="5" placeholder="Your answer" class="{input_cls}" autofocus>{draft}</textarea>
<div class="flex gap-3"><button type="submit" class="{btn}">Submit answer</button></div>
</form>
<form method="post" action="/quiz/reset" class="mt-3"><button type="submit" class="{btn2}">Skip</button></form>"#,
                mode = mode,
                badge = level_badge(level),
                name = html_escape(term_name),
                question = html_escape(question),
                input_cls = INPUT_CLS,
                draft = html_escape(draft),
                btn = BTN_PRIMARY,
                btn2 = BTN_SECONDARY,
            )
        }
        QuizState::Grading { term_name, .. } => format!(
            r#"<meta http-equiv="refresh" content="2"><p class="text-[#888]">Grading your answer on {}…</p>"#,
            html_escape(term_name)
        ),
        QuizState::Finished(outcome) => {
            let verdict = if outcome.passed() { "Passed" } else { "Not yet" };
            format!(
                r#"<div class="flex items-baseline gap-3 mb-4"><span class="text-4xl font-semibold text-[#e0e0e0]">{score}</span><span class="text-[#888]">/ 100 · {verdict}</span></div>
<p class="text-sm mb-4"><span class="text-[#888]">{name}:</span> {change}</p>
<h3 class="text-xs uppercase tracking-wider text-[#888] mb-1">Feedback</h3>
<div class="mb-4 whitespace-pre-wrap">{feedback}</div>
<h3 class="text-xs uppercase tracking-wider text-[#888] mb-1">Your answer</h3>
<div class="mb-4 whitespace-pre-wrap">{answer}</div>
<h3 class="text-xs uppercase tracking-wider text-[#888] mb-1">Model answer</h3>
<div class="mb-6 whitespace-pre-wrap">{model}</div>
<div class="flex gap-3">{again}<form method="post" action="/quiz/reset" class="inline"><button type="submit" class="{btn2}">Done</button></form></div>"#,
                score = outcome.grading.score,
                verdict = verdict,
                name = html_escape(&outcome.term_name),
                change = html_escape(&outcome.change.to_string()),
                feedback = html_escape(&outcome.grading.feedback),
                answer = html_escape(&outcome.answer),
                model = html_escape(&outcome.grading.model_answer),
                again = start_form(outcome.mode, "Next question"),
                btn2 = BTN_SECONDARY,
            )
        }
    };

    let notice = st.notice.take();
    layout("Quiz", "/quiz", due, notice, &content)
}

#[derive(Deserialize)]
struct StartForm {
    #[serde(default)]
    mode: String,
}

async fn quiz_start<S: Store + 'static, T: Tutor>(
    State(state): State<SharedState<S, T>>,
    Form(form): Form<StartForm>,
) -> Redirect {
    let ticket = {
        let mut st = state.inner.lock().await;
        let Some(mode) = Mode::parse(&form.mode) else {
            st.notice = Some(format!("unknown quiz mode: {}", form.mode));
            return Redirect::to("/quiz");
        };
        let mut rng = rand::rng();
        match st.session.begin_quiz(mode, Utc::now(), &mut rng) {
            Ok(ticket) => ticket,
            Err(e) => {
                st.notice = Some(notice_for(&e));
                return Redirect::to("/quiz");
            }
        }
    };

    let pending = PendingStep::new(&state, Session::question_failed);
    let result = state.tutor.generate_question(&ticket.term_name).await;

    let mut st = state.inner.lock().await;
    pending.disarm();
    match result {
        Ok(question) => {
            if let Err(e) = st.session.question_ready(question) {
                st.notice = Some(notice_for(&e));
            }
        }
        Err(e) => {
            log::error!("question generation for {} failed: {e}", ticket.term_name);
            st.session.question_failed();
            st.notice = Some(notice_for(&e));
        }
    }
    Redirect::to("/quiz")
}

#[derive(Deserialize)]
struct AnswerForm {
    #[serde(default)]
    answer: String,
}

async fn quiz_answer<S: Store + 'static, T: Tutor>(
    State(state): State<SharedState<S, T>>,
    Form(form): Form<AnswerForm>,
) -> Redirect {
    let request = {
        let mut st = state.inner.lock().await;
        match st.session.begin_grading(&form.answer) {
            Ok(request) => request,
            Err(e) => {
                st.notice = Some(notice_for(&e));
                return Redirect::to("/quiz");
            }
        }
    };

    let pending = PendingStep::new(&state, Session::grading_failed);
    let result = state.tutor.grade_answer(&request).await;

    let mut st = state.inner.lock().await;
    pending.disarm();
    let outcome = match result {
        Ok(grading) => st.session.finish_grading(grading, Utc::now()),
        Err(e) => {
            st.session.grading_failed();
            Err(e)
        }
    };
    if let Err(e) = outcome {
        log::error!("grading {} failed: {e}", request.term_name);
        st.notice = Some(notice_for(&e));
    }
    Redirect::to("/quiz")
}

async fn quiz_reset<S: Store + 'static, T: Tutor>(State(state): State<SharedState<S, T>>) -> Redirect {
    state.inner.lock().await.session.reset_quiz();
    Redirect::to("/quiz")
}

async fn history_page<S: Store + 'static, T: Tutor>(State(state): State<SharedState<S, T>>) -> Html<String> {
    let mut st = state.inner.lock().await;
    let now = Utc::now();
    refresh(&mut st, now);
    let due = st.session.due_terms(now).len();
    let history = st.session.history();
    let stats = history.stats();

    let mut rows = String::new();
    if history.is_empty() {
        rows.push_str(r#"<p class="text-center text-[#666] py-12">No quiz history yet.</p>"#);
    }
    for entry in history.entries() {
        let question: String = entry.question.chars().take(100).collect();
        let ellipsis = if entry.question.chars().count() > 100 { "…" } else { "" };
        rows.push_str(&format!(
            r#"<div class="bg-[#2a2a2a] rounded-md px-4 py-3 mb-2">
<div class="flex justify-between text-xs text-[#888]"><span>{date}</span><span class="font-semibold text-[#e0e0e0]">{score} pts</span></div>
<div class="text-sm mt-1">{name} <span class="text-[#888]">[{mode}] ({change})</span></div>
<div class="text-sm text-[#aaa] mt-1">{question}{ellipsis}</div>
</div>"#,
            date = entry.date.format("%Y/%m/%d %H:%M"),
            score = entry.score,
            name = html_escape(&entry.term_name),
            mode = entry.mode,
            change = html_escape(&entry.level_change),
            question = html_escape(&question),
            ellipsis = ellipsis,
        ));
    }

    let content = format!(
        r#"<ul class="list-none m-0 mb-6 p-0 max-w-lg">
<li class="flex justify-between py-2 border-b border-[#333] text-[0.9rem]"><span class="text-[#888]">Questions answered</span><span class="font-semibold text-[#e0e0e0]">{total}</span></li>
<li class="flex justify-between py-2 border-b border-[#333] text-[0.9rem]"><span class="text-[#888]">Average score</span><span class="font-semibold text-[#e0e0e0]">{average}</span></li>
<li class="flex justify-between py-2 text-[0.9rem]"><span class="text-[#888]">Registered terms</span><span class="font-semibold text-[#e0e0e0]">{terms}</span></li>
</ul>
{rows}
<form method="post" action="/history/clear" class="mt-4" onsubmit="return confirm('Clear all history?')"><button type="submit" class="{btn}">Clear history</button></form>"#,
        total = stats.total_questions,
        average = stats.average_score,
        terms = st.session.terms().len(),
        rows = rows,
        btn = BTN_SECONDARY,
    );
    let notice = st.notice.take();
    layout("History", "/history", due, notice, &content)
}

async fn history_clear<S: Store + 'static, T: Tutor>(State(state): State<SharedState<S, T>>) -> Redirect {
    let mut st = state.inner.lock().await;
    if let Err(e) = st.session.clear_history() {
        st.notice = Some(notice_for(&e));
    }
    Redirect::to("/history")
}

// -- JSON API --

pub struct ApiError(StatusCode, String);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let status = match &e {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Service(_) => StatusCode::BAD_GATEWAY,
            Error::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

#[derive(Deserialize)]
struct GenerateQuestionBody {
    #[serde(default, alias = "terms")]
    term: String,
}

async fn api_generate_question<S: Store + 'static, T: Tutor>(
    State(state): State<SharedState<S, T>>,
    Json(body): Json<GenerateQuestionBody>,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    if body.term.trim().is_empty() {
        return Err(Error::validation("no term was provided").into());
    }
    let question = state.tutor.generate_question(body.term.trim()).await?;
    Ok(Json(json!({ "question": question })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GradeAnswerBody {
    #[serde(default, alias = "terms")]
    term: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    question: String,
    #[serde(default)]
    user_answer: String,
}

async fn api_grade_answer<S: Store + 'static, T: Tutor>(
    State(state): State<SharedState<S, T>>,
    Json(body): Json<GradeAnswerBody>,
) -> std::result::Result<Json<crate::tutor::Grading>, ApiError> {
    if body.term.trim().is_empty()
        || body.question.trim().is_empty()
        || body.user_answer.trim().is_empty()
    {
        return Err(Error::validation("term, question and userAnswer are required").into());
    }
    let request = GradeRequest {
        term_name: body.term,
        description: body.description,
        question: body.question,
        user_answer: body.user_answer,
    };
    Ok(Json(state.tutor.grade_answer(&request).await?))
}

async fn api_health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "message": "server is running" }))
}

async fn log_request(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let response = next.run(req).await;
    log::info!("{} {} -> {}", method, uri, response.status());
    response
}

pub fn router<S: Store + 'static, T: Tutor>(state: SharedState<S, T>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index::<S, T>))
        .route("/terms", post(term_create::<S, T>))
        .route("/terms/delete", post(term_delete::<S, T>))
        .route("/dictionary", get(dictionary::<S, T>))
        .route("/quiz", get(quiz_page::<S, T>))
        .route("/quiz/start", post(quiz_start::<S, T>))
        .route("/quiz/answer", post(quiz_answer::<S, T>))
        .route("/quiz/reset", post(quiz_reset::<S, T>))
        .route("/history", get(history_page::<S, T>))
        .route("/history/clear", post(history_clear::<S, T>))
        .route("/api/generate-question", post(api_generate_question::<S, T>))
        .route("/api/grade-answer", post(api_grade_answer::<S, T>))
        .route("/api/health", get(api_health))
        .with_state(state)
        .layer(from_fn(log_request))
        .layer(cors)
}

// -- Public entry point --

pub async fn serve(config: &Config) -> Result<()> {
    let store = FileStore::open(&config.data_dir)?;
    let session = Session::open(store, Utc::now())?;
    let tutor = OpenAiTutor::new(&config.tutor)?;

    println!(
        "Loaded {} terms from {}.",
        session.terms().len(),
        config.data_dir.display()
    );
    log::info!("using model {}", tutor.model());

    let app = router(AppState::new(session, tutor));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Server(format!("cannot bind {addr}: {e}")))?;
    println!("Serving at http://localhost:{}", config.port);

    axum::serve(listener, app)
        .await
        .map_err(|e| Error::Server(e.to_string()))
}
