//! Nexthop learning.
//!
//! When a host has no cached handler, the learner works out a backend base
//! URL for it by probing candidate ports with a TCP dial.

use std::time::Duration;

use tokio::net::TcpStream;

use portcullis_core::{strip_port, RewriteResult};

/// Probes hosts for a reachable backend port.
#[derive(Debug, Clone)]
pub struct Learner {
    https_ports: Vec<u16>,
    http_ports: Vec<u16>,
    dial_timeout: Duration,
}

impl Learner {
    /// Create a learner probing `https_ports` first, then `http_ports`.
    #[must_use]
    pub fn new(https_ports: Vec<u16>, http_ports: Vec<u16>, dial_timeout: Duration) -> Self {
        Self {
            https_ports,
            http_ports,
            dial_timeout,
        }
    }

    /// Work out a backend base URL for a resolved host.
    ///
    /// A URL rule yields its target without probing. A host carrying an
    /// explicit port is probed as-is and served over `http`. A bare host is
    /// tried on every HTTPS port, then every HTTP port; the first port that
    /// accepts a connection wins.
    pub async fn learn(&self, result: &RewriteResult) -> Option<String> {
        if let Some(base) = result.base_url() {
            return Some(base);
        }

        let host = result.host.as_str();
        if strip_port(host).len() < host.len() {
            return self.reachable(host).await.then(|| format!("http://{host}"));
        }

        for &port in &self.https_ports {
            if self.reachable(&format!("{host}:{port}")).await {
                return Some(if port == 443 {
                    format!("https://{host}")
                } else {
                    format!("https://{host}:{port}")
                });
            }
        }
        for &port in &self.http_ports {
            if self.reachable(&format!("{host}:{port}")).await {
                return Some(if port == 80 {
                    format!("http://{host}")
                } else {
                    format!("http://{host}:{port}")
                });
            }
        }

        tracing::debug!(host, "No reachable port found");
        None
    }

    async fn reachable(&self, addr: &str) -> bool {
        match tokio::time::timeout(self.dial_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::trace!(addr, error = %e, "Probe refused");
                false
            }
            Err(_) => {
                tracing::trace!(addr, "Probe timed out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    fn learner(https: Vec<u16>, http: Vec<u16>) -> Learner {
        Learner::new(https, http, Duration::from_millis(500))
    }

    async fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn url_rule_is_used_without_probing() {
        let result = RewriteResult {
            host: "app.modern.corp".to_string(),
            scheme: "https".to_string(),
            port: "8443".to_string(),
            full_url: "https://modern.corp:8443".to_string(),
        };
        assert_eq!(
            learner(vec![], vec![]).learn(&result).await.as_deref(),
            Some("https://app.modern.corp:8443")
        );
    }

    #[tokio::test]
    async fn explicit_port_is_probed_over_http() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let result = RewriteResult::unchanged(&format!("127.0.0.1:{port}"));
        assert_eq!(
            learner(vec![], vec![]).learn(&result).await,
            Some(format!("http://127.0.0.1:{port}"))
        );
    }

    #[tokio::test]
    async fn https_ports_win_over_http_ports() {
        let https = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let http = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let https_port = https.local_addr().unwrap().port();
        let http_port = http.local_addr().unwrap().port();

        let result = RewriteResult::unchanged("127.0.0.1");
        assert_eq!(
            learner(vec![https_port], vec![http_port]).learn(&result).await,
            Some(format!("https://127.0.0.1:{https_port}"))
        );

        let closed = free_port().await;
        assert_eq!(
            learner(vec![closed], vec![http_port]).learn(&result).await,
            Some(format!("http://127.0.0.1:{http_port}"))
        );
    }

    #[tokio::test]
    async fn unreachable_host_is_not_learned() {
        let closed = free_port().await;
        let result = RewriteResult::unchanged("127.0.0.1");
        assert!(learner(vec![closed], vec![]).learn(&result).await.is_none());
    }
}
