use reqwest::Proxy;

/// Proxy configuration types
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ProxyType {
    /// HTTP proxy
    Http,
    /// HTTPS proxy
    Https,
    /// SOCKS5 proxy
    Socks5,
}

/// Proxy authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

/// Proxy used for both the manifest request and segment downloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Proxy server URL (e.g., "http://proxy.example.com:8080")
    pub url: String,
    pub proxy_type: ProxyType,
    pub auth: Option<ProxyAuth>,
}

impl ProxyConfig {
    /// Infer the proxy type from the URL scheme. Bare `host:port` means HTTP.
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let proxy_type = match url.split_once("://").map(|(scheme, _)| scheme) {
            Some("https") => ProxyType::Https,
            Some("socks5") | Some("socks5h") => ProxyType::Socks5,
            _ => ProxyType::Http,
        };
        Self {
            url,
            proxy_type,
            auth: None,
        }
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some(ProxyAuth {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Build the reqwest proxy. Routes all schemes through the proxy since
    /// manifests and segments may live on different hosts.
    pub fn build(&self) -> Result<Proxy, String> {
        let proxy_url = match self.proxy_type {
            ProxyType::Socks5
                if !(self.url.starts_with("socks5://") || self.url.starts_with("socks5h://")) =>
            {
                format!("socks5://{}", self.url)
            }
            _ => self.url.clone(),
        };

        let mut proxy = Proxy::all(&proxy_url)
            .map_err(|e| format!("Invalid {:?} proxy URL `{proxy_url}`: {e}", self.proxy_type))?;

        if let Some(auth) = &self.auth {
            proxy = proxy.basic_auth(&auth.username, &auth.password);
        }

        Ok(proxy)
    }
}
