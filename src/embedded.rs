use axum::{
    body::Body,
    extract::Path,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use rust_embed::RustEmbed;
use std::borrow::Cow;
use tera::Tera;

// Page templates, compiled into the binary.
#[derive(RustEmbed)]
#[folder = "templates"]
#[include = "*.html"]
struct TemplateAssets;

// Stylesheets and scripts served under /static.
#[derive(RustEmbed)]
#[folder = "static"]
struct StaticAssets;

/// Builds the template engine from the embedded `templates/` folder.
pub fn load_templates() -> Result<Tera, tera::Error> {
    let mut sources = Vec::new();
    for name in TemplateAssets::iter() {
        if let Some(file) = TemplateAssets::get(&name) {
            let body = String::from_utf8_lossy(&file.data).into_owned();
            sources.push((name.into_owned(), body));
        }
    }

    let mut tera = Tera::default();
    // Added in one batch so `{% extends %}` resolves regardless of order.
    tera.add_raw_templates(sources)?;
    Ok(tera)
}

fn build_response(content: Cow<'static, [u8]>, path: &str) -> Response {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    (
        [(header::CONTENT_TYPE, mime.as_ref().to_string())],
        Body::from(content.into_owned()),
    )
        .into_response()
}

pub async fn serve_static(Path(path): Path<String>) -> Response {
    match StaticAssets::get(&path) {
        Some(content) => build_response(content.data, &path),
        None => (StatusCode::NOT_FOUND, "404 Not Found").into_response(),
    }
}
