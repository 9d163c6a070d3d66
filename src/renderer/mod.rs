//! Content negotiation and response bodies.
//!
//! [`negotiate`] picks one of the endpoint's declared renderers;
//! [`Renderer::render`] turns a handler payload into wire bytes. Error
//! bodies are always JSON and are produced by the dispatcher, not here.

use crate::dispatcher::ApiResponse;
use crate::spec::{EndpointSpec, RendererKind};
use minijinja::{context, Environment};
use serde_json::Value;
use tracing::{error, warn};

const ENDPOINT_TEMPLATE_NAME: &str = "endpoint.html";

const ENDPOINT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{{ spec.name }}</title>
<style>
body { font-family: sans-serif; margin: 2em; color: #222; }
code, pre { background: #f4f4f4; padding: 0.2em 0.4em; }
pre { padding: 1em; overflow-x: auto; }
table { border-collapse: collapse; margin-bottom: 1.5em; }
th, td { border: 1px solid #ccc; padding: 0.3em 0.8em; text-align: left; }
.tag { background: #e0e8f0; border-radius: 3px; padding: 0.1em 0.5em; margin-right: 0.3em; }
</style>
</head>
<body>
<h1>{{ spec.name }}</h1>
<p><code>{{ spec.method }} {{ spec.path }}</code>
{% for tag in spec.tags %}<span class="tag">{{ tag }}</span>{% endfor %}</p>
{% if spec.description %}<p>{{ spec.description }}</p>{% endif %}
{% if spec.auth_required %}<p><strong>Authentication required.</strong></p>{% endif %}
{% if spec.params_description %}
<h2>Parameters</h2>
<table>
<tr><th>Name</th><th>Type</th><th>Required</th><th>Description</th></tr>
{% for name, doc in spec.params_description|items %}
<tr><td><code>{{ name }}</code></td><td>{{ doc.type }}</td><td>{% if name in spec.required_params %}yes{% else %}no{% endif %}</td><td>{{ doc.description }}</td></tr>
{% endfor %}
</table>
{% endif %}
{% if spec.responses %}
<h2>Responses</h2>
<table>
<tr><th>Status</th><th>Description</th></tr>
{% for status, doc in spec.responses|items %}
<tr><td>{{ status }}</td><td>{{ doc.description }}</td></tr>
{% endfor %}
</table>
{% endif %}
<h2>Response <small>HTTP {{ status }}</small></h2>
<pre>{{ payload }}</pre>
</body>
</html>
"#;

/// Pick the representation for one response.
///
/// Precedence: `?format=` query value, then the `Accept` header (honouring
/// `q` weights), then the endpoint's first declared renderer. A result the
/// endpoint does not declare falls back to the first declared renderer.
#[must_use]
pub fn negotiate(spec: &EndpointSpec, accept: Option<&str>, format_query: Option<&str>) -> RendererKind {
    let declared = |kind: RendererKind| spec.renderers.contains(&kind);

    if let Some(kind) = format_query.and_then(format_kind) {
        return if declared(kind) {
            kind
        } else {
            spec.default_renderer()
        };
    }

    if let Some(accept) = accept {
        let mut ranges: Vec<(&str, f32)> = accept
            .split(',')
            .filter_map(|entry| {
                let mut parts = entry.split(';');
                let media = parts.next()?.trim();
                if media.is_empty() {
                    return None;
                }
                let q = parts
                    .filter_map(|p| p.trim().strip_prefix("q="))
                    .find_map(|q| q.trim().parse::<f32>().ok())
                    .unwrap_or(1.0);
                Some((media, q))
            })
            .filter(|(_, q)| *q > 0.0)
            .collect();
        // Stable: equal weights keep header order
        ranges.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        for (media, _) in ranges {
            if media == "*/*" {
                return spec.default_renderer();
            }
            if let Some(kind) = media_kind(media).filter(|k| declared(*k)) {
                return kind;
            }
        }
    }

    spec.default_renderer()
}

fn format_kind(format: &str) -> Option<RendererKind> {
    match format.trim().to_ascii_lowercase().as_str() {
        "json" => Some(RendererKind::Json),
        "browsable" | "api" | "html" => Some(RendererKind::Browsable),
        _ => None,
    }
}

fn media_kind(media: &str) -> Option<RendererKind> {
    let media = media.to_ascii_lowercase();
    match media.as_str() {
        "application/json" | "application/*" => Some(RendererKind::Json),
        "text/html" | "application/xhtml+xml" | "text/*" => Some(RendererKind::Browsable),
        m if m.ends_with("+json") => Some(RendererKind::Json),
        _ => None,
    }
}

/// Turns handler payloads into response bodies
pub struct Renderer {
    env: Environment<'static>,
    browsable_ready: bool,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    #[must_use]
    pub fn new() -> Self {
        let mut env = Environment::new();
        let browsable_ready = match env.add_template(ENDPOINT_TEMPLATE_NAME, ENDPOINT_TEMPLATE) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Browsable template failed to compile; serving JSON only");
                false
            }
        };
        Self {
            env,
            browsable_ready,
        }
    }

    /// Render a success payload in the negotiated representation
    #[must_use]
    pub fn render(&self, spec: &EndpointSpec, kind: RendererKind, status: u16, payload: &Value) -> ApiResponse {
        match kind {
            RendererKind::Json => ApiResponse::json(status, payload),
            RendererKind::Browsable => match self.render_browsable(spec, status, payload) {
                Ok(html) => ApiResponse::new(status, kind.media_type(), html.into_bytes()),
                Err(e) => {
                    warn!(endpoint = %spec.name, error = %e, "Browsable rendering failed, falling back to JSON");
                    ApiResponse::json(status, payload)
                }
            },
        }
    }

    /// HTML documentation page for an endpoint, embedding `payload`
    pub fn render_browsable(
        &self,
        spec: &EndpointSpec,
        status: u16,
        payload: &Value,
    ) -> Result<String, minijinja::Error> {
        if !self.browsable_ready {
            return Err(minijinja::Error::new(
                minijinja::ErrorKind::TemplateNotFound,
                "browsable template unavailable",
            ));
        }
        let pretty = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
        let template = self.env.get_template(ENDPOINT_TEMPLATE_NAME)?;
        template.render(context! {
            spec => spec,
            status => status,
            payload => pretty,
        })
    }
}
