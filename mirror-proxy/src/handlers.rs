//! Request handlers of the mirror service. Each handler gets the state it needs
//! passed in explicitly.
use crate::config::Config;
use crate::errors::MirrorError;
use crate::metrics_defs::{REDIRECTS, RESOLVE_FAILED, TASKS_DROPPED};
use crate::query::{QueryParams, QuerySource, update_center_query};
use http::header::{CONTENT_TYPE, LOCATION};
use http::request::Parts;
use http::{Method, Response, StatusCode, Uri};
use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;
use serde::Serialize;
use shared::counter;
use shared::http::{full_body, make_boxed_response};
use std::sync::Arc;
use update_center::download_counter::{DownloadCounter, UPDATE_CENTER_PLUGIN, current_year};
use update_center::resolver::{UpdateCenterQuery, UpdateCenterResolver};
use update_center::work_pool::{Task, WorkPoolHandle};
use url::{Position, Url};

pub type MirrorResponse = Response<BoxBody<Bytes, MirrorError>>;

/// JSON server alias that always names `default_json_server`.
const DEFAULT_JSON_SERVER_ALIAS: &str = "default";

/// Everything the handlers share. Built once at startup.
pub struct MirrorState {
    pub config: Config,
    pub resolver: UpdateCenterResolver,
    pub work_pool: WorkPoolHandle,
    pub counter: Arc<DownloadCounter>,
}

#[derive(Serialize)]
struct ResponseData<T> {
    data: Option<T>,
    error: Option<String>,
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for ResponseData<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => ResponseData {
                data: Some(data),
                error: None,
            },
            Err(e) => ResponseData {
                data: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Mirror location of an update center resolved by the upstream: the path and
/// query of `official`, served from the selected JSON server and provider.
pub fn provider_url(config: &Config, official: &Url, query: &UpdateCenterQuery) -> String {
    let provider = if query.provider.is_empty() {
        &config.default_provider
    } else {
        &query.provider
    };

    let json_server = match query.json_server.as_str() {
        DEFAULT_JSON_SERVER_ALIAS => &config.default_json_server,
        alias => config
            .json_servers
            .get(alias)
            .unwrap_or(&config.default_json_server),
    };

    let request_uri = &official[Position::BeforePath..Position::AfterQuery];
    format!("{json_server}/{provider}{request_uri}")
}

/// Name of the plugin a download path refers to, e.g. `git` for `.../git/4.0.0/git.hpi`.
pub fn plugin_name(path: &str) -> &str {
    let file = path.rsplit('/').next().unwrap_or_default();
    file.split('.').next().unwrap_or_default()
}

/// `GET /update-center.json`
pub async fn update_center(state: &MirrorState, parts: &Parts) -> Result<MirrorResponse, MirrorError> {
    let params = QueryParams::parse(parts.uri.query());
    let query = update_center_query(&[&params as &dyn QuerySource, &parts.headers]);

    let counter = state.counter.clone();
    submit(state, Task::new(move || counter.record_update_center_visit())).await;

    match state.resolver.resolve_and_cache(&query).await {
        Ok(official) => {
            let location = provider_url(&state.config, &official, &query);
            counter!(REDIRECTS, "kind" => "update_center").increment(1);
            tracing::debug!(version = %query.version, %location, "Redirecting update center");
            redirect(&location)
        }
        Err(e) => {
            counter!(RESOLVE_FAILED).increment(1);
            tracing::warn!(version = %query.version, error = %e, "Could not resolve update center");
            Ok(make_boxed_response(StatusCode::NOT_FOUND, e.to_string()))
        }
    }
}

/// `GET /json-servers`
pub fn json_servers(config: &Config) -> Result<MirrorResponse, MirrorError> {
    let mut servers = config.json_servers.clone();
    servers.insert(
        DEFAULT_JSON_SERVER_ALIAS.to_string(),
        config.default_json_server.clone(),
    );
    json_response(&servers)
}

/// `GET /providers`
pub fn providers(config: &Config) -> Result<MirrorResponse, MirrorError> {
    let mut providers = config.providers.clone();
    if !providers.contains(&config.default_provider) {
        providers.push(config.default_provider.clone());
    }
    json_response(&providers)
}

/// `GET /providers/default`
pub fn default_provider(config: &Config) -> MirrorResponse {
    make_boxed_response(StatusCode::OK, config.default_provider.clone())
}

/// `GET /status`
pub fn status() -> MirrorResponse {
    make_boxed_response(StatusCode::OK, "ok")
}

/// Redirects a plugin binary request to the plugin mirror. Only `GET` counts
/// as a download.
pub async fn plugin_download(state: &MirrorState, parts: &Parts) -> Result<MirrorResponse, MirrorError> {
    let path = parts.uri.path();
    let plugin = plugin_name(path);

    if parts.method != Method::GET {
        tracing::debug!(path, method = %parts.method, "Not counting download");
    } else if plugin.is_empty() {
        tracing::debug!(path, "No plugin name in download path");
    } else {
        let counter = state.counter.clone();
        let task = Task::with_data(plugin.to_string(), move |plugin| {
            counter.record_download(&plugin)
        });
        submit(state, task).await;
    }

    let location = format!(
        "{}{}",
        state.config.plugin_mirror.host.trim_end_matches('/'),
        path
    );
    counter!(REDIRECTS, "kind" => "plugin").increment(1);
    redirect(&location)
}

/// `GET /plugins/data?year=Y&name=N`, defaulting to the current year and the
/// update center visits.
pub fn plugin_data(state: &MirrorState, uri: &Uri) -> Result<MirrorResponse, MirrorError> {
    let params = QueryParams::parse(uri.query());
    let year = params
        .get("year")
        .filter(|y| !y.is_empty())
        .map(str::to_string)
        .unwrap_or_else(current_year);
    let name = params
        .get("name")
        .filter(|n| !n.is_empty())
        .unwrap_or(UPDATE_CENTER_PLUGIN);

    let data = state
        .counter
        .find_plugin_data(&year, name)
        .map(|counts| counts.data);
    json_response(&ResponseData::from(data))
}

/// `GET /plugins/list?year=Y`
pub fn plugin_list(state: &MirrorState, uri: &Uri) -> Result<MirrorResponse, MirrorError> {
    let params = QueryParams::parse(uri.query());
    let year = params
        .get("year")
        .filter(|y| !y.is_empty())
        .map(str::to_string)
        .unwrap_or_else(current_year);

    json_response(&ResponseData::from(state.counter.plugin_names(&year)))
}

async fn submit(state: &MirrorState, task: Task) {
    if let Err(e) = state.work_pool.submit(task).await {
        counter!(TASKS_DROPPED).increment(1);
        tracing::warn!(error = %e, "Statistics update dropped");
    }
}

fn redirect(location: &str) -> Result<MirrorResponse, MirrorError> {
    Ok(Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .header(LOCATION, location)
        .body(full_body(Bytes::new()))?)
}

fn json_response<T: Serialize>(value: &T) -> Result<MirrorResponse, MirrorError> {
    match serde_json::to_vec(value) {
        Ok(data) => Ok(Response::builder()
            .header(CONTENT_TYPE, "application/json")
            .body(full_body(data))?),
        Err(e) => Ok(make_boxed_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            e.to_string(),
        )),
    }
}
