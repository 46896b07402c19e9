use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use actix_web::http::header::{CACHE_CONTROL, IF_MODIFIED_SINCE, LAST_MODIFIED};
use actix_web::http::StatusCode;
use actix_web::{
    get, middleware::Logger, post, web, App, HttpRequest, HttpResponse, HttpServer, Responder,
    ResponseError,
};
use httpdate::HttpDate;

use crate::config::{LIVE_REFRESH, PER_PAGE};
use crate::controller::{ControllerStatus, NavCommand, PageController};
use crate::error::VizError;
use crate::log_reader::LogTable;
use crate::render;
use crate::views::{ViewKind, ViewSource};

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("nothing rendered yet")]
    NotRendered,

    #[error("unknown command {0}")]
    UnknownCommand(String),
}

impl ResponseError for ViewerError {
    fn status_code(&self) -> StatusCode {
        match self {
            ViewerError::NotRendered => StatusCode::NOT_FOUND,
            ViewerError::UnknownCommand(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).body(self.to_string())
    }
}

struct RenderedPage {
    png: Vec<u8>,
    modified: SystemTime,
}

struct ViewerInner {
    controller: PageController,
    table: LogTable,
    keys: Vec<String>,
    rendered: Option<RenderedPage>,
}

/// Shared state of an interactive view.
pub struct ViewerState {
    source: ViewSource,
    inner: Mutex<ViewerInner>,
}

impl ViewerState {
    /// Loads the log once and renders the first page.
    pub fn new(source: ViewSource) -> Result<Self, VizError> {
        let table = source.load()?;
        let keys = table.keys();
        if source.kind == ViewKind::Bayes && keys.is_empty() {
            return Err(VizError::NoMatchingData(format!(
                "No keys found in {}",
                source.path.display()
            )));
        }
        log::info!("{}: {} keys", source.path.display(), keys.len());

        let mut controller = PageController::new(source.kind == ViewKind::Live);
        controller.set_key_count(keys.len(), PER_PAGE);
        let state = ViewerState {
            source,
            inner: Mutex::new(ViewerInner {
                controller,
                table,
                keys,
                rendered: None,
            }),
        };
        state.redraw(&mut state.lock());
        Ok(state)
    }

    fn lock(&self) -> MutexGuard<'_, ViewerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> ControllerStatus {
        self.lock().controller.status()
    }

    /// Applies a navigation command. The live view re-reads the log before
    /// redrawing; nothing is redrawn while paused.
    pub fn navigate(&self, command: NavCommand) -> ControllerStatus {
        let mut inner = self.lock();
        let changed = inner.controller.apply(command);
        if changed && !inner.controller.paused() {
            if self.source.kind == ViewKind::Live {
                self.reload(&mut inner);
            }
            self.redraw(&mut inner);
        }
        inner.controller.status()
    }

    /// Timer tick: re-runs the whole pipeline unless paused.
    pub fn refresh(&self) {
        let mut inner = self.lock();
        if inner.controller.paused() {
            return;
        }
        self.reload(&mut inner);
        self.redraw(&mut inner);
    }

    /// Replaces the table unless the read fails or drops every key, in which
    /// case the last good page stays up.
    fn reload(&self, inner: &mut ViewerInner) {
        match self.source.try_load() {
            Ok(table) if table.is_empty() && !inner.keys.is_empty() => {
                log::warn!("{}: no rows to display, keeping last page", self.source.path.display());
            }
            Ok(table) => {
                inner.keys = table.keys();
                inner.table = table;
                inner.controller.set_key_count(inner.keys.len(), PER_PAGE);
            }
            Err(err) => log::warn!("Failed to reload {}: {}", self.source.path.display(), err),
        }
    }

    fn redraw(&self, inner: &mut ViewerInner) {
        let page = inner.controller.current_page();
        let Some(figure) = self.source.figure(&inner.table, &inner.keys, page) else {
            inner.rendered = None;
            return;
        };
        match render::render_page(&figure).and_then(|img| render::encode_png(&img)) {
            Ok(png) => {
                inner.rendered = Some(RenderedPage {
                    png,
                    modified: SystemTime::now(),
                });
            }
            Err(err) => log::warn!("Failed to render page {}: {:#}", page + 1, err),
        }
    }

    fn current_png(&self) -> Option<(Vec<u8>, SystemTime)> {
        self.lock()
            .rendered
            .as_ref()
            .map(|r| (r.png.clone(), r.modified))
    }
}

fn is_not_modified(req: &HttpRequest, modified_time: SystemTime) -> bool {
    if let Some(ims) = req.headers().get(IF_MODIFIED_SINCE) {
        if let Ok(ims_str) = ims.to_str() {
            if let Ok(ims_time) = httpdate::parse_http_date(ims_str) {
                return modified_time <= ims_time;
            }
        }
    }
    false
}

const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>__TITLE__</title>
<style>
body { margin: 0; background: #fff; font-family: sans-serif; }
#note { padding: 4px 8px; color: #555; font-size: 13px; }
img { display: block; max-width: 100%; }
</style>
</head>
<body>
<div id="note"></div>
<img id="page" alt="">
<script>
const live = __LIVE__;
const img = document.getElementById("page");
const note = document.getElementById("note");

function show(s) {
  const page = s.total_pages ? s.page + 1 : 0;
  note.textContent = "Page " + page + "/" + s.total_pages + (s.paused ? " (paused)" : "")
    + (live ? "  [left/right: page, space: pause]" : "  [left/right: page]");
}

async function reload() {
  const r = await fetch("/page.png", { cache: "no-cache" });
  if (!r.ok) { note.textContent = "No data to display"; return; }
  const old = img.src;
  img.src = URL.createObjectURL(await r.blob());
  if (old.startsWith("blob:")) URL.revokeObjectURL(old);
}

async function send(cmd) {
  const r = await fetch("/nav/" + cmd, { method: "POST" });
  if (r.ok) show(await r.json());
  reload();
}

document.addEventListener("keydown", (e) => {
  if (e.key === "ArrowRight") send("next");
  else if (e.key === "ArrowLeft") send("prev");
  else if (e.key === " " && live) { e.preventDefault(); send("pause"); }
});

fetch("/status").then((r) => r.json()).then(show);
reload();
if (live) setInterval(() => { reload(); fetch("/status").then((r) => r.json()).then(show); }, __REFRESH_MS__);
</script>
</body>
</html>
"#;

#[get("/")]
async fn index(state: web::Data<ViewerState>) -> impl Responder {
    let (title, live) = match state.source.kind {
        ViewKind::Bayes => ("Bayes Beta Evolution", "false"),
        ViewKind::Live => ("EMA Priors", "true"),
    };
    let body = INDEX_HTML
        .replace("__TITLE__", title)
        .replace("__LIVE__", live)
        .replace("__REFRESH_MS__", &LIVE_REFRESH.as_millis().to_string());
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

#[get("/page.png")]
async fn page_png(
    req: HttpRequest,
    state: web::Data<ViewerState>,
) -> Result<HttpResponse, ViewerError> {
    let (png, modified_time) = state.current_png().ok_or(ViewerError::NotRendered)?;
    if is_not_modified(&req, modified_time) {
        return Ok(HttpResponse::NotModified().finish());
    }
    Ok(HttpResponse::Ok()
        .content_type("image/png")
        .insert_header((CACHE_CONTROL, "no-cache"))
        .insert_header((LAST_MODIFIED, HttpDate::from(modified_time).to_string()))
        .body(png))
}

#[get("/status")]
async fn current_status(state: web::Data<ViewerState>) -> impl Responder {
    web::Json(state.status())
}

#[post("/nav/{command}")]
async fn nav(
    path: web::Path<String>,
    state: web::Data<ViewerState>,
) -> Result<web::Json<ControllerStatus>, ViewerError> {
    let name = path.into_inner();
    let command = NavCommand::parse(&name).ok_or(ViewerError::UnknownCommand(name))?;
    Ok(web::Json(state.navigate(command)))
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(index)
        .service(page_png)
        .service(current_status)
        .service(nav);
}

/// Serves the view until the process is stopped.
pub async fn serve(source: ViewSource, bind: &str, port: u16) -> anyhow::Result<()> {
    let live = source.kind == ViewKind::Live;
    let state = web::Data::new(ViewerState::new(source)?);

    if live {
        let ticking = state.clone();
        actix_web::rt::spawn(async move {
            let mut ticker = actix_web::rt::time::interval(LIVE_REFRESH);
            loop {
                ticker.tick().await;
                ticking.refresh();
            }
        });
    }

    log::info!("Starting viewer at http://{}:{}", bind, port);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(routes)
    })
    .workers(1)
    .bind((bind, port))?
    .run()
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::{
        call_and_read_body, call_and_read_body_json, call_service, init_service, TestRequest,
    };
    use std::io::Write;

    fn bayes_state(csv: &str) -> (tempfile::NamedTempFile, web::Data<ViewerState>) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(csv.as_bytes()).unwrap();
        let source = ViewSource {
            kind: ViewKind::Bayes,
            path: file.path().to_path_buf(),
            delimiter: b',',
        };
        let state = ViewerState::new(source).unwrap();
        (file, web::Data::new(state))
    }

    const FIVE_KEYS: &str = "key,value,reward\nk1,a,1\nk2,a,0\nk3,a,1\nk4,b,0\nk5,b,1\n";

    #[actix_web::test]
    async fn next_wraps_past_last_page() {
        let (_file, state) = bayes_state(FIVE_KEYS);
        assert!(state.current_png().is_some());
        let app = init_service(App::new().app_data(state.clone()).configure(routes)).await;

        let req = TestRequest::post().uri("/nav/next").to_request();
        let status: ControllerStatus = call_and_read_body_json(&app, req).await;
        assert_eq!(status.page, 1);
        assert_eq!(status.total_pages, 2);

        let req = TestRequest::post().uri("/nav/next").to_request();
        let status: ControllerStatus = call_and_read_body_json(&app, req).await;
        assert_eq!(status.page, 0);
    }

    #[actix_web::test]
    async fn pause_is_ignored_for_bayes() {
        let (_file, state) = bayes_state(FIVE_KEYS);
        let app = init_service(App::new().app_data(state.clone()).configure(routes)).await;
        let req = TestRequest::post().uri("/nav/pause").to_request();
        let status: ControllerStatus = call_and_read_body_json(&app, req).await;
        assert!(!status.paused);
    }

    #[actix_web::test]
    async fn unknown_command_is_not_found() {
        let (_file, state) = bayes_state(FIVE_KEYS);
        let app = init_service(App::new().app_data(state).configure(routes)).await;
        let req = TestRequest::post().uri("/nav/jump").to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn index_enables_pause_only_when_live() {
        let (_file, state) = bayes_state(FIVE_KEYS);
        let app = init_service(App::new().app_data(state).configure(routes)).await;
        let req = TestRequest::get().uri("/").to_request();
        let body = call_and_read_body(&app, req).await;
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("const live = false;"));
        assert!(html.contains("Bayes Beta Evolution"));
    }

    #[test]
    fn bayes_without_keys_fails_at_startup() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"key,value,reward\n").unwrap();
        let source = ViewSource {
            kind: ViewKind::Bayes,
            path: file.path().to_path_buf(),
            delimiter: b',',
        };
        assert!(matches!(ViewerState::new(source), Err(VizError::NoMatchingData(_))));
    }

    #[test]
    fn bayes_schema_error_stops_startup() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"key,reward\nk,1\n").unwrap();
        let source = ViewSource {
            kind: ViewKind::Bayes,
            path: file.path().to_path_buf(),
            delimiter: b',',
        };
        assert!(matches!(ViewerState::new(source), Err(VizError::Schema { .. })));
    }

    #[test]
    fn paused_live_view_skips_refresh() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"key,value,new_prior\nk1,a,0.5\n").unwrap();
        let source = ViewSource {
            kind: ViewKind::Live,
            path: file.path().to_path_buf(),
            delimiter: b',',
        };
        let state = ViewerState::new(source).unwrap();
        assert!(state.navigate(NavCommand::TogglePause).paused);

        file.write_all(b"k2,a,0.6\nk3,a,0.7\nk4,a,0.7\nk5,a,0.7\n").unwrap();
        file.flush().unwrap();
        state.refresh();
        assert_eq!(state.status().total_pages, 1);

        state.navigate(NavCommand::TogglePause);
        state.refresh();
        assert_eq!(state.status().total_pages, 2);
    }

    #[test]
    fn failed_reload_keeps_last_page() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"key,value,new_prior\nk1,a,0.5\nk2,a,0.6\n").unwrap();
        file.flush().unwrap();
        let source = ViewSource {
            kind: ViewKind::Live,
            path: file.path().to_path_buf(),
            delimiter: b',',
        };
        let state = ViewerState::new(source).unwrap();
        assert_eq!(state.status().total_pages, 1);
        assert!(state.current_png().is_some());

        // a row caught halfway through being written
        file.write_all(b"k3,a").unwrap();
        file.flush().unwrap();
        state.refresh();
        assert_eq!(state.status().total_pages, 1);
        assert!(state.current_png().is_some());

        // the log is truncated
        file.as_file().set_len(0).unwrap();
        state.refresh();
        assert_eq!(state.status().total_pages, 1);
        assert!(state.current_png().is_some());
    }

    #[actix_web::test]
    async fn page_png_serves_rendered_image() {
        let (_file, state) = bayes_state(FIVE_KEYS);
        let app = init_service(App::new().app_data(state).configure(routes)).await;
        let req = TestRequest::get().uri("/page.png").to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key(LAST_MODIFIED));
    }

    #[test]
    fn not_modified_compares_http_dates() {
        let modified = httpdate::parse_http_date("Sun, 18 Oct 2026 10:00:00 GMT").unwrap();
        let req = TestRequest::get()
            .insert_header((IF_MODIFIED_SINCE, "Sun, 18 Oct 2026 10:00:05 GMT"))
            .to_http_request();
        assert!(is_not_modified(&req, modified));
        let stale = TestRequest::get()
            .insert_header((IF_MODIFIED_SINCE, "Sun, 18 Oct 2026 09:59:00 GMT"))
            .to_http_request();
        assert!(!is_not_modified(&stale, modified));
    }
}
