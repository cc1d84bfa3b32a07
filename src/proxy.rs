use url::Url;

use crate::error::{DubError, Result};

/// Environment variables exported to spawned tools when a proxy is set.
pub const PROXY_ENV_VARS: [&str; 6] = [
    "HTTP_PROXY",
    "http_proxy",
    "HTTPS_PROXY",
    "https_proxy",
    "ALL_PROXY",
    "all_proxy",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
}

/// Normalized proxy settings shared by the HTTP client and external tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub protocol: String,
    pub host: String,
    pub port: Option<u16>,
    pub credentials: Option<ProxyCredentials>,
    pub proxy_url: String,
}

impl ProxyConfig {
    /// Parse `[<PROTOCOL>://][<USERNAME>:<PASSWORD>@]<HOST>[:<PORT>]`.
    ///
    /// The protocol defaults to http. Only http and https proxies are accepted.
    pub fn parse(input: &str) -> Result<Self> {
        let normalized = if input.contains("://") {
            input.to_string()
        } else {
            format!("http://{}", input)
        };

        let parsed = Url::parse(&normalized)
            .map_err(|e| DubError::InvalidProxy(format!("{}: {}", input, e)))?;

        let protocol = parsed.scheme().to_string();
        if protocol != "http" && protocol != "https" {
            return Err(DubError::InvalidProxy(
                "Only HTTP and HTTPS proxies are supported".to_string(),
            ));
        }

        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DubError::InvalidProxy(format!("{}: missing host", input)))?
            .to_string();
        let port = parsed.port();

        let credentials = if !parsed.username().is_empty() || parsed.password().is_some() {
            Some(ProxyCredentials {
                username: decode(parsed.username()),
                password: decode(parsed.password().unwrap_or_default()),
            })
        } else {
            None
        };

        // Url keeps userinfo percent-encoded, so it can be reused verbatim.
        let auth_part = match &credentials {
            Some(_) => match parsed.password() {
                Some(password) if !password.is_empty() => {
                    format!("{}:{}@", parsed.username(), password)
                }
                _ => format!("{}@", parsed.username()),
            },
            None => String::new(),
        };
        let port_part = port.map(|p| format!(":{}", p)).unwrap_or_default();
        let proxy_url = format!("{}://{}{}{}", protocol, auth_part, host, port_part);

        Ok(Self {
            protocol,
            host,
            port,
            credentials,
            proxy_url,
        })
    }

    /// Build the transport-level proxy for the HTTP client.
    pub fn to_reqwest(&self) -> Result<reqwest::Proxy> {
        reqwest::Proxy::all(&self.proxy_url).map_err(|e| DubError::InvalidProxy(e.to_string()))
    }
}

fn decode(component: &str) -> String {
    urlencoding::decode(component)
        .map(|value| value.into_owned())
        .unwrap_or_else(|_| component.to_string())
}
