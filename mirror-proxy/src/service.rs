use crate::errors::MirrorError;
use crate::handlers::{self, MirrorResponse, MirrorState};
use http::request::Parts;
use http::{Method, StatusCode};
use hyper::body::Incoming;
use hyper::service::Service;
use hyper::Request;
use shared::http::make_boxed_error_response;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

#[derive(Clone)]
pub struct MirrorService {
    state: Arc<MirrorState>,
}

impl MirrorService {
    pub fn new(state: Arc<MirrorState>) -> Self {
        Self { state }
    }
}

impl Service<Request<Incoming>> for MirrorService {
    type Response = MirrorResponse;
    type Error = MirrorError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let state = self.state.clone();
        // Request bodies are never read
        let (parts, _body) = req.into_parts();

        Box::pin(async move { Ok(route(&state, &parts).await) })
    }
}

/// Dispatches a request to its handler. Handler failures become a 500.
pub async fn route(state: &MirrorState, parts: &Parts) -> MirrorResponse {
    if parts.method != Method::GET && parts.method != Method::HEAD {
        return make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED);
    }

    let path = parts.uri.path();
    let result = match path {
        "/update-center.json" => handlers::update_center(state, parts).await,
        "/json-servers" => handlers::json_servers(&state.config),
        "/providers" => handlers::providers(&state.config),
        "/providers/default" => Ok(handlers::default_provider(&state.config)),
        "/status" => Ok(handlers::status()),
        "/plugins/data" => handlers::plugin_data(state, &parts.uri),
        "/plugins/list" => handlers::plugin_list(state, &parts.uri),
        p if p.starts_with(state.config.plugin_mirror.path_prefix.as_str()) => {
            handlers::plugin_download(state, parts).await
        }
        _ => Ok(make_boxed_error_response(StatusCode::NOT_FOUND)),
    };

    result.unwrap_or_else(|e| {
        tracing::error!(path, error = %e, "Request failed");
        make_boxed_error_response(StatusCode::INTERNAL_SERVER_ERROR)
    })
}
