//! Proxy address validation
//!
//! Accepted forms, each optionally prefixed by `scheme://`:
//! ```text
//!   host:port
//!   host:port:user:pass
//!   user:pass@host:port
//! ```

use crate::error::{Result, VaultError};

const SCHEMES: [&str; 4] = ["http", "https", "socks4", "socks5"];

/// A parsed proxy address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAddr {
    pub scheme: Option<String>,
    pub host: String,
    pub port: u16,
    pub credentials: Option<(String, String)>,
}

impl ProxyAddr {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        let (scheme, rest) = match input.split_once("://") {
            Some((scheme, rest)) => {
                let scheme = scheme.to_ascii_lowercase();
                if !SCHEMES.contains(&scheme.as_str()) {
                    return Err(invalid(input, "unsupported scheme"));
                }
                (Some(scheme), rest)
            }
            None => (None, input),
        };

        let (host, port, credentials) = match rest.rsplit_once('@') {
            Some((creds, host_port)) => {
                let (user, pass) = creds
                    .split_once(':')
                    .ok_or_else(|| invalid(input, "credentials must be user:pass"))?;
                let (host, port) = host_port
                    .split_once(':')
                    .ok_or_else(|| invalid(input, "missing port"))?;
                (host, port, Some((user, pass)))
            }
            None => {
                let parts: Vec<&str> = rest.split(':').collect();
                match parts.as_slice() {
                    [host, port] => (*host, *port, None),
                    [host, port, user, pass] => (*host, *port, Some((*user, *pass))),
                    _ => return Err(invalid(input, "expected host:port[:user:pass]")),
                }
            }
        };

        if host.is_empty() || host.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(invalid(input, "bad host"));
        }

        let port: u16 = port
            .parse()
            .map_err(|_| invalid(input, "port must be a number in 1-65535"))?;
        if port == 0 {
            return Err(invalid(input, "port must be a number in 1-65535"));
        }

        let credentials = match credentials {
            Some((user, pass)) if user.is_empty() || pass.is_empty() => {
                return Err(invalid(input, "empty user or password"));
            }
            Some((user, pass)) => Some((user.to_string(), pass.to_string())),
            None => None,
        };

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
            credentials,
        })
    }
}

/// Validate a proxy record's primary field
pub fn validate_proxy(input: &str) -> Result<ProxyAddr> {
    ProxyAddr::parse(input)
}

fn invalid(input: &str, reason: &str) -> VaultError {
    VaultError::Invalid(format!("malformed proxy {:?}: {}", input, reason))
}
