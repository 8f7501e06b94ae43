use once_cell::sync::Lazy;
use url::Url;

pub static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime")
});

pub fn spawn_async<F>(fut: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    RUNTIME.spawn(fut);
}

pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// The push endpoint that lives next to a REST root: same host, `ws` or
/// `wss`, path `/socket`.
pub fn socket_url_for(base_url: &str) -> Option<String> {
    if base_url.trim().is_empty() {
        return None;
    }
    let mut url = Url::parse(&normalize_url(base_url)).ok()?;
    let scheme = if url.scheme() == "http" { "ws" } else { "wss" };
    url.set_scheme(scheme).ok()?;
    url.set_path("/socket");
    url.set_query(None);
    url.set_fragment(None);
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_hosts_default_to_https() {
        assert_eq!(normalize_url(" chat.example.com/api "), "https://chat.example.com/api");
        assert_eq!(normalize_url("http://localhost:5000"), "http://localhost:5000");
    }

    #[test]
    fn socket_url_follows_scheme_and_port() {
        assert_eq!(
            socket_url_for("http://localhost:5000/api").as_deref(),
            Some("ws://localhost:5000/socket")
        );
        assert_eq!(
            socket_url_for("chat.example.com/api?x=1").as_deref(),
            Some("wss://chat.example.com/socket")
        );
        assert_eq!(socket_url_for("  "), None);
    }
}
