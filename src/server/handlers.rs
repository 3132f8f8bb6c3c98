use futures_util::TryStreamExt;
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use std::convert::Infallible;
use tracing::{debug, info, warn};
use warp::{
    http::{header, HeaderValue, Uri},
    hyper::Body,
    multipart::{FormData, Part},
    reply::{Reply, Response},
    Buf,
};

use super::{views, AppState, Caller};
use crate::{
    archive::{build_archive, ARCHIVE_NAME},
    cleanup::schedule_cleanup,
    error::AppError,
    pipeline::{generate_cycle, prepare_upload},
    render::document_filename,
    session::UploadSession,
};

#[derive(Debug, Default, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub prefix: String,
}

fn redirect(to: &'static str) -> Response {
    warp::redirect::see_other(Uri::from_static(to)).into_response()
}

/// Flash the error's notice and send the caller to the landing page.
fn fail(state: &AppState, caller: &Caller, err: AppError) -> Response {
    warn!(session = %caller.id, "{}", err);
    state.sessions.flash(caller.id, err.notice());
    redirect("/")
}

fn attachment(bytes: Vec<u8>, content_type: &'static str, filename: &str) -> Response {
    let fallback: String = filename
        .chars()
        .map(|c| if c.is_ascii() && c != '"' && !c.is_ascii_control() { c } else { '_' })
        .collect();
    let disposition = format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        utf8_percent_encode(filename, NON_ALPHANUMERIC)
    );

    let mut resp = Response::new(Body::from(bytes));
    let headers = resp.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    resp
}

pub async fn index(state: AppState, cookie: Option<String>) -> Result<Response, Infallible> {
    let caller = state.caller(cookie);
    let notices = state.sessions.take_notices(caller.id);
    let resp = warp::reply::html(views::page(&notices, None)).into_response();
    Ok(caller.attach(resp))
}

pub async fn display(state: AppState, cookie: Option<String>) -> Result<Response, Infallible> {
    let caller = state.caller(cookie);
    let upload = state.sessions.load(caller.id);
    let notices = state.sessions.take_notices(caller.id);
    debug!(session = %caller.id, has_data = upload.is_some(), "display");
    let resp = warp::reply::html(views::page(&notices, upload.as_ref())).into_response();
    Ok(caller.attach(resp))
}

struct UploadFields {
    excel: Option<(String, Vec<u8>)>,
    prefix: String,
}

async fn read_part(part: Part) -> Result<Vec<u8>, warp::Error> {
    part.stream()
        .try_fold(Vec::new(), |mut acc, mut buf| async move {
            let chunk = buf.copy_to_bytes(buf.remaining());
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await
}

async fn read_form(form: FormData) -> Result<UploadFields, AppError> {
    let mut form = Box::pin(form);
    let mut fields = UploadFields {
        excel: None,
        prefix: String::new(),
    };

    while let Some(part) = form
        .try_next()
        .await
        .map_err(|e| AppError::InvalidInput(format!("multipart: {e}")))?
    {
        let name = part.name().to_string();
        match name.as_str() {
            "excel" => {
                let filename = part.filename().unwrap_or_default().to_string();
                let bytes = read_part(part)
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("reading file: {e}")))?;
                if !filename.is_empty() {
                    fields.excel = Some((filename, bytes));
                }
            }
            "prefix" => {
                let bytes = read_part(part)
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("reading prefix: {e}")))?;
                fields.prefix = String::from_utf8_lossy(&bytes).trim().to_string();
            }
            _ => {}
        }
    }
    Ok(fields)
}

async fn receive_upload(state: &AppState, form: FormData) -> Result<UploadSession, AppError> {
    let fields = read_form(form).await?;
    let (filename, bytes) = fields
        .excel
        .ok_or_else(|| AppError::InvalidInput("no file in field `excel`".to_string()))?;
    info!(file = %filename, bytes = bytes.len(), prefix = %fields.prefix, "upload received");

    let city_column = state.config.city_column.clone();
    let workspace = state.workspace.clone();
    let renderer = state.renderer.clone();
    let prefix = fields.prefix;

    tokio::task::spawn_blocking(move || {
        let prepared = prepare_upload(&filename, bytes, &city_column)?;
        generate_cycle(prepared, &prefix, &workspace, &renderer)
    })
    .await
    .map_err(|e| AppError::Internal(format!("upload task: {e}")))?
}

pub async fn upload(
    state: AppState,
    cookie: Option<String>,
    form: Option<FormData>,
) -> Result<Response, Infallible> {
    let caller = state.caller(cookie);
    let outcome = match form {
        Some(form) => receive_upload(&state, form).await,
        None => Err(AppError::InvalidInput("not a multipart upload".to_string())),
    };

    let resp = match outcome {
        Ok(upload) => {
            info!(session = %caller.id, cycle = %upload.cycle, groups = upload.groups.len(), "upload complete");
            if let Some(replaced) = state.sessions.save(caller.id, upload) {
                debug!(session = %caller.id, cycle = %replaced.cycle, "previous cycle superseded");
                schedule_cleanup(
                    state.workspace.cycle(replaced.cycle).all(),
                    state.config.cleanup_delay,
                );
            }
            state.sessions.flash(caller.id, "PDFs generated successfully!");
            redirect("/display")
        }
        Err(e) => fail(&state, &caller, e),
    };
    Ok(caller.attach(resp))
}

pub async fn download_zip(state: AppState, cookie: Option<String>) -> Result<Response, Infallible> {
    let caller = state.caller(cookie);
    let Some(upload) = state.sessions.load(caller.id) else {
        let resp = fail(&state, &caller, AppError::NothingToArchive);
        return Ok(caller.attach(resp));
    };

    let areas = state.workspace.cycle(upload.cycle);
    let documents = areas.documents.clone();
    let built = tokio::task::spawn_blocking(move || build_archive(&documents))
        .await
        .map_err(|e| AppError::Internal(format!("archive task: {e}")))
        .and_then(|r| r.map_err(AppError::from));

    let bytes = match built {
        Ok(bytes) => bytes,
        Err(e) => {
            let resp = fail(&state, &caller, e);
            return Ok(caller.attach(resp));
        }
    };

    state.sessions.clear(caller.id);
    schedule_cleanup(areas.all(), state.config.cleanup_delay);
    info!(session = %caller.id, cycle = %areas.id, bytes = bytes.len(), "archive delivered");

    let mut resp = attachment(bytes, "application/zip", ARCHIVE_NAME);
    let headers = resp.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    Ok(caller.attach(resp))
}

pub async fn download_city(
    city: String,
    query: DownloadQuery,
    state: AppState,
    cookie: Option<String>,
) -> Result<Response, Infallible> {
    let caller = state.caller(cookie);
    let city = percent_decode_str(&city).decode_utf8_lossy().into_owned();
    let filename = document_filename(&query.prefix, &city);

    let Some(upload) = state.sessions.load(caller.id) else {
        let resp = fail(&state, &caller, AppError::NotFound(filename));
        return Ok(caller.attach(resp));
    };

    let path = state.workspace.cycle(upload.cycle).documents.join(&filename);
    let resp = match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!(path = %path.display(), "serving document");
            attachment(bytes, "application/pdf", &filename)
        }
        Err(e) => fail(&state, &caller, AppError::NotFound(format!("{}: {e}", path.display()))),
    };
    Ok(caller.attach(resp))
}

pub async fn health() -> Result<Response, Infallible> {
    let body = serde_json::json!({
        "status": "healthy",
        "service": "cityreports"
    });
    Ok(warp::reply::json(&body).into_response())
}
