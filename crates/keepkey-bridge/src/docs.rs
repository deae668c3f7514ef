//! API documentation routes

use axum::http::header::CONTENT_TYPE;
use axum::response::{Html, IntoResponse};

/// OpenAPI document for the bridge
pub const SWAGGER_JSON: &str = include_str!("../api/swagger.json");

const DOCS_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>KeepKey Bridge API</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: "/spec/swagger.json", dom_id: "#swagger-ui" });
    };
  </script>
</body>
</html>
"##;

/// `GET /docs`
pub async fn docs() -> Html<&'static str> {
    Html(DOCS_HTML)
}

/// `GET /spec/swagger.json`
pub async fn swagger() -> impl IntoResponse {
    ([(CONTENT_TYPE, "application/json")], SWAGGER_JSON)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swagger_document_is_valid_json() {
        let doc: serde_json::Value = serde_json::from_str(SWAGGER_JSON).unwrap();
        let paths = doc["paths"].as_object().unwrap();
        for path in ["/status", "/pair/{code}", "/exchange/device", "/user", "/sign"] {
            assert!(paths.contains_key(path), "missing {}", path);
        }
    }

    #[test]
    fn test_docs_page_points_at_swagger() {
        assert!(DOCS_HTML.contains(r##"dom_id: "#swagger-ui""##));
        assert!(DOCS_HTML.contains(r#"url: "/spec/swagger.json""#));
        assert!(DOCS_HTML.trim_end().ends_with("</html>"));
    }
}
