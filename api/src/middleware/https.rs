use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

const HSTS: &str = "max-age=63072000; includeSubDomains";

/// HTTPS location for a request the proxy saw over plain HTTP, if any.
///
/// TLS terminates at the reverse proxy, which reports the original scheme in
/// `X-Forwarded-Proto`. A missing header counts as HTTPS.
fn https_location(headers: &HeaderMap, uri: &Uri) -> Option<Uri> {
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("https");
    if !proto.eq_ignore_ascii_case("http") {
        return None;
    }

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    format!("https://{host}{path_and_query}").parse().ok()
}

/// Redirects plain-HTTP requests to HTTPS (301) and stamps HSTS on every
/// response. Enabled with `EDUTRACK_REQUIRE_HTTPS=true`.
pub async fn require_https(req: Request, next: Next) -> Response {
    let mut response = match https_location(req.headers(), req.uri()) {
        Some(location) => {
            (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location.to_string())])
                .into_response()
        }
        None => next.run(req).await,
    };
    response
        .headers_mut()
        .insert(header::STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS));
    response
}
