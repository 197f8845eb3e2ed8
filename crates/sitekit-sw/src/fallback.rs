//! Synthetic responses served when neither network nor cache can answer.

use http::StatusCode;
use sitekit_net::Response;

/// Self-contained offline document: inline styles, no external references.
const OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Offline</title>
    <style>
      body {
        font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
        display: flex;
        align-items: center;
        justify-content: center;
        height: 100vh;
        margin: 0;
        background: #f7f4ed;
        color: #1a1612;
      }
      .offline-message { text-align: center; }
      .offline-message h1 { font-size: 2rem; margin-bottom: 1rem; }
      .offline-message p { font-size: 1.1rem; opacity: 0.8; }
    </style>
  </head>
  <body>
    <div class="offline-message">
      <h1>You're Offline</h1>
      <p>Please check your internet connection and try again.</p>
    </div>
  </body>
</html>
"#;

/// Image miss while offline.
pub fn image_unavailable() -> Response {
    Response::plain_text(StatusCode::NOT_FOUND, "Image not available offline")
}

/// Network-first miss while offline.
pub fn content_unavailable() -> Response {
    Response::plain_text(StatusCode::SERVICE_UNAVAILABLE, "Content not available offline")
}

/// Default-strategy miss while offline.
pub fn not_available() -> Response {
    Response::plain_text(StatusCode::SERVICE_UNAVAILABLE, "Not available offline")
}

/// Navigation with nothing cached. Status 200 so the page always renders.
pub fn offline_page() -> Response {
    Response::html(StatusCode::OK, OFFLINE_PAGE)
}
