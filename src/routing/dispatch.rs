use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{self, Body};
use axum::extract::State;
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::api::{ask, cities, health};
use crate::state::AppState;

const DEFAULT_BODY_LIMIT_BYTES: usize = 256 * 1024;

enum RouteMatch {
    Health,
    Ask,
    Cities,
    StreamCities,
    MethodNotAllowed,
    NotFound,
}

/// Dispatch a raw HTTP request to the matching handler.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    base_path: Arc<str>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let (parts, body) = request.into_parts();
    let route = match_route(&parts.method, parts.uri.path(), base_path.as_ref());

    let response = match route {
        RouteMatch::Health => health::health_handler(State(state)).into_response(),
        RouteMatch::Ask => {
            let body_bytes = if parts.method == Method::POST {
                match read_request_body(body).await {
                    Ok(bytes) => bytes,
                    Err(response) => return Ok(response),
                }
            } else {
                Bytes::new()
            };
            ask::handler(state, parts, body_bytes).await
        }
        RouteMatch::Cities => cities::cities_handler(state, parts).await,
        RouteMatch::StreamCities => cities::stream_cities_handler(state, parts).await,
        RouteMatch::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        RouteMatch::NotFound => StatusCode::NOT_FOUND.into_response(),
    };

    Ok(response)
}

#[must_use]
pub fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.trim_end_matches('/').to_string()
    } else {
        format!("/{}", trimmed.trim_end_matches('/'))
    }
}

async fn read_request_body(body: Body) -> Result<Bytes, Response> {
    body::to_bytes(body, DEFAULT_BODY_LIMIT_BYTES)
        .await
        .map_err(|_| {
            (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large (max 256KiB)",
            )
                .into_response()
        })
}

fn match_route(method: &Method, path: &str, base_path: &str) -> RouteMatch {
    let Some(path) = strip_base_path(path, base_path) else {
        return RouteMatch::NotFound;
    };

    match path {
        "/" => {
            if method == Method::GET {
                RouteMatch::Health
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        "/req" => {
            if method == Method::GET || method == Method::POST {
                RouteMatch::Ask
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        "/cities" => {
            if method == Method::GET {
                RouteMatch::Cities
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        "/stream-cities" => {
            if method == Method::GET {
                RouteMatch::StreamCities
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        _ => RouteMatch::NotFound,
    }
}

fn strip_base_path<'a>(path: &'a str, base_path: &str) -> Option<&'a str> {
    if base_path.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(base_path)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_path() {
        assert_eq!(normalize_base_path(""), "");
        assert_eq!(normalize_base_path("/"), "");
        assert_eq!(normalize_base_path("/api"), "/api");
        assert_eq!(normalize_base_path("api/"), "/api");
        assert_eq!(normalize_base_path(" /api/ "), "/api");
    }

    #[test]
    fn test_strip_base_path() {
        assert_eq!(strip_base_path("/req", ""), Some("/req"));
        assert_eq!(strip_base_path("/api/req", "/api"), Some("/req"));
        assert_eq!(strip_base_path("/api", "/api"), Some("/"));
        assert_eq!(strip_base_path("/apix/req", "/api"), None);
        assert_eq!(strip_base_path("/other/req", "/api"), None);
    }

    #[test]
    fn test_route_methods() {
        assert!(matches!(
            match_route(&Method::GET, "/req", ""),
            RouteMatch::Ask
        ));
        assert!(matches!(
            match_route(&Method::POST, "/req", ""),
            RouteMatch::Ask
        ));
        assert!(matches!(
            match_route(&Method::DELETE, "/req", ""),
            RouteMatch::MethodNotAllowed
        ));
        assert!(matches!(
            match_route(&Method::GET, "/cities", ""),
            RouteMatch::Cities
        ));
        assert!(matches!(
            match_route(&Method::POST, "/stream-cities", ""),
            RouteMatch::MethodNotAllowed
        ));
        assert!(matches!(
            match_route(&Method::GET, "/nope", ""),
            RouteMatch::NotFound
        ));
    }
}
