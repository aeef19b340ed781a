use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::EmbedError;

/// Payload the dashboard posts to the portal to request navigation
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NavigationMessage {
    #[serde(default)]
    pub redirect_path: Option<String>,
}

/// The dashboard as shown inside the portal frame
#[derive(Clone, Debug)]
pub struct EmbedFrame {
    dashboard_url: Url,
    origin: String,
}

impl EmbedFrame {
    pub fn new(dashboard_url: Url) -> Result<Self, EmbedError> {
        let origin = dashboard_url.origin();
        if !origin.is_tuple() {
            return Err(EmbedError::OpaqueOrigin(dashboard_url.to_string()));
        }

        Ok(Self {
            origin: origin.ascii_serialization(),
            dashboard_url,
        })
    }

    pub fn parse(dashboard_url: &str) -> Result<Self, EmbedError> {
        Self::new(Url::parse(dashboard_url)?)
    }

    /// `scheme://host[:port]` of the dashboard
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Frame source with the portal's query parameters forwarded
    pub fn src<I, K, V>(&self, query: I) -> Url
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut src = self.dashboard_url.clone();
        let mut pairs: Vec<(K, V)> = query.into_iter().collect();
        if pairs.is_empty() {
            return src;
        }

        {
            let mut serializer = src.query_pairs_mut();
            for (key, value) in pairs.drain(..) {
                serializer.append_pair(key.as_ref(), value.as_ref());
            }
        }
        src
    }

    /// Same as [`src`](Self::src) for a raw `a=1&b=2` query string
    pub fn src_from_query_string(&self, query: &str) -> Url {
        let query = query.trim_start_matches('?');
        self.src(url::form_urlencoded::parse(query.as_bytes()))
    }

    /// Redirect path carried by a message, if it came from the dashboard.
    ///
    /// Messages from other origins, payloads without `redirectPath` and
    /// paths that would leave the portal are ignored.
    pub fn handle_message(&self, origin: &str, payload: &serde_json::Value) -> Option<String> {
        if !self.is_dashboard_origin(origin) {
            debug!(origin, expected = %self.origin, "Ignoring message from foreign origin");
            return None;
        }

        let message: NavigationMessage = serde_json::from_value(payload.clone()).ok()?;
        let path = message.redirect_path?;

        // Protocol-relative "//host" would navigate off the portal
        if !path.starts_with('/') || path.starts_with("//") {
            debug!(path = %path, "Ignoring non-local redirect path");
            return None;
        }
        Some(path)
    }

    /// Full page embedding the dashboard, with the portal query forwarded.
    ///
    /// The page script applies the same rules as
    /// [`handle_message`](Self::handle_message) before navigating.
    pub fn page(&self, query: &str) -> String {
        let src = self.src_from_query_string(query);
        // Origins are ASCII scheme://host[:port], so a JSON string is safe inside <script>
        let origin = serde_json::Value::String(self.origin.clone()).to_string();

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Headlamp</title>
    <style>
        html, body {{ margin: 0; height: 100%; }}
        iframe {{ border: none; width: 100%; height: 100%; display: block; }}
    </style>
</head>
<body>
    <iframe src="{src}" title="Headlamp"></iframe>
    <script>
        window.addEventListener("message", (event) => {{
            if (event.origin !== {origin}) return;
            const path = event.data && event.data.redirectPath;
            if (typeof path === "string" && path.startsWith("/") && !path.startsWith("//")) {{
                window.location.assign(path);
            }}
        }});
    </script>
</body>
</html>"#,
            src = escape_attribute(src.as_str()),
            origin = origin,
        )
    }

    fn is_dashboard_origin(&self, origin: &str) -> bool {
        match Url::parse(origin) {
            Ok(url) => url.origin().ascii_serialization() == self.origin,
            Err(_) => false,
        }
    }
}

/// Shown in place of the frame until the dashboard answers its health check
pub fn loading_page(refresh_secs: u64) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta http-equiv="refresh" content="{refresh_secs}">
    <title>Headlamp</title>
</head>
<body>
    <p>Waiting for Headlamp to start...</p>
</body>
</html>"#
    )
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
