//! Front-end serving
//!
//! Serves an already built single-page application from a directory, with
//! `index.html` as the fallback for client-side routes. Without a directory a
//! built-in page lists the API instead.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::services::ServeDir;
use tracing::warn;

/// State for front-end serving
#[derive(Clone)]
pub struct FrontendState {
    pub base_path: Arc<String>,
    pub directory: Arc<PathBuf>,
}

impl FrontendState {
    pub fn new(base_path: String, directory: PathBuf) -> Self {
        Self {
            base_path: Arc::new(base_path),
            directory: Arc::new(directory),
        }
    }
}

/// Create a router for the front-end
///
/// With a directory this serves:
/// - GET / -> index.html with an injected `<base href>` tag
/// - any existing file under the directory
/// - index.html for every other path
pub fn create_frontend_router(base_path: String, directory: Option<PathBuf>) -> Router {
    let Some(directory) = directory else {
        return Router::new().route("/", get(|| async { serve_fallback_page() }));
    };

    let state = FrontendState::new(base_path, directory.clone());
    let spa_fallback = get(serve_index_page).with_state(state.clone());

    Router::new()
        .route("/", get(serve_index_page))
        .fallback_service(ServeDir::new(directory).fallback(spa_fallback))
        .with_state(state)
}

/// Insert `<base href="{base_path}/">` right after `<head>`
pub fn inject_base_tag(contents: &str, base_path: &str) -> String {
    let mut contents = contents.to_string();
    if let Some(head_position) = contents.find("<head>") {
        let insert_position = head_position + "<head>".len();
        let base_tag = format!("\n    <base href=\"{}/\">", base_path);
        contents.insert_str(insert_position, &base_tag);
    }
    contents
}

/// Serve index.html from the front-end directory
///
/// Caching: max-age=3600 (1 hour) for index.html
async fn serve_index_page(State(state): State<FrontendState>) -> Response {
    let index_path = state.directory.join("index.html");
    match tokio::fs::read_to_string(&index_path).await {
        Ok(contents) => (
            [(header::CACHE_CONTROL, "public, max-age=3600")],
            Html(inject_base_tag(&contents, &state.base_path)),
        )
            .into_response(),
        Err(error) => {
            warn!(path = %index_path.display(), "Front-end index not readable: {}", error);
            serve_fallback_page()
        }
    }
}

/// Page shown when no built front-end is available
fn serve_fallback_page() -> Response {
    let html = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>pgdesk</title>
    <style>
        body {
            font-family: system-ui, -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            max-width: 820px;
            margin: 60px auto;
            padding: 20px;
            color: #1f2933;
        }
        code {
            background: #f0f4f8;
            padding: 2px 6px;
            border-radius: 4px;
            font-family: 'JetBrains Mono', Consolas, monospace;
            font-size: 0.9em;
        }
        ul {
            line-height: 1.9;
        }
        .note {
            background: #fff8e1;
            border-left: 4px solid #f0b429;
            padding: 12px 18px;
            border-radius: 4px;
        }
    </style>
</head>
<body>
    <h1>pgdesk</h1>
    <p class="note">No front-end directory is configured. Set <code>server.frontend_dir</code> to a built front-end to use the browser UI.</p>

    <h2>API</h2>
    <ul>
        <li><code>GET /api/connections</code> - saved connections</li>
        <li><code>POST /api/connections/test</code> - test connection settings</li>
        <li><code>GET /api/connections/{id}/schemas</code> - schemas</li>
        <li><code>GET /api/connections/{id}/schemas/{schema}/tables</code> - tables and views</li>
        <li><code>GET /api/connections/{id}/schemas/{schema}/tables/{table}</code> - columns, keys and indexes</li>
        <li><code>GET /api/connections/{id}/schemas/{schema}/tables/{table}/rows</code> - browse rows</li>
        <li><code>POST /api/connections/{id}/query</code> - run SQL</li>
        <li><code>POST /api/sql/format</code> - format SQL</li>
        <li><code>GET /api/saved-queries</code> - saved queries</li>
        <li><code>GET /api/history</code> - query history</li>
    </ul>

    <h2>Security</h2>
    <p class="note">There is no authentication. Keep the server bound to a local address.</p>
</body>
</html>
"#;

    (
        StatusCode::OK,
        [(header::CACHE_CONTROL, "no-cache")],
        Html(html),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[test]
    fn test_inject_base_tag() {
        let html = "<html><head><title>x</title></head></html>";
        let injected = inject_base_tag(html, "/admin");
        assert!(injected.contains("<head>\n    <base href=\"/admin/\">"));
        assert_eq!(inject_base_tag("<p>no head</p>", "/admin"), "<p>no head</p>");
    }

    #[test]
    fn test_fallback_page_has_content() {
        let response = serve_fallback_page();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/html; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn test_spa_fallback_serves_index() {
        let directory = tempfile::tempdir().unwrap();
        std::fs::write(
            directory.path().join("index.html"),
            "<html><head></head><body>app</body></html>",
        )
        .unwrap();
        std::fs::create_dir(directory.path().join("assets")).unwrap();
        std::fs::write(directory.path().join("assets/app.js"), "console.log(1)").unwrap();

        let router = create_frontend_router(String::new(), Some(directory.path().to_path_buf()));

        let asset = router
            .clone()
            .oneshot(Request::get("/assets/app.js").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(asset.status(), StatusCode::OK);
        let content_type = asset.headers().get(header::CONTENT_TYPE).unwrap().to_str().unwrap();
        assert!(content_type.contains("javascript"));

        let route = router
            .oneshot(Request::get("/tables/users").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(route.status(), StatusCode::OK);
        let body = axum::body::to_bytes(route.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("<base href=\"/\">"));
    }
}
