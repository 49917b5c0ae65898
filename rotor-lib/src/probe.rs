//! Verifies that a tunnel interface egresses to the public Internet by
//! fetching from a small list of IP-echo endpoints bound to that interface's
//! address.

use async_trait::async_trait;
use thiserror::Error;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::command_runner::{self, CommandRunner};
use crate::tunnel::Slot;

pub const DEFAULT_CANDIDATES: &[&str] = &[
    "https://httpbin.org/ip",
    "https://api.ipify.org?format=json",
    "https://ipecho.net/plain",
];

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Command(#[from] command_runner::Error),
    #[error("no assigned address found for interface")]
    NoInterfaceAddress,
}

#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self, slot: Slot) -> Result<bool, Error>;
}

/// Parses `ip -4 addr show <interface>` for the interface's assigned IPv4
/// address, then issues GETs against each candidate bound to that address.
/// The first non-empty successful response is a pass; exhausting all
/// candidates is a fail. Multiple candidates exist to tolerate a single
/// upstream outage without misreporting tunnel health.
pub struct HttpReachabilityProbe {
    runner: Arc<dyn CommandRunner>,
    candidates: Vec<String>,
    request_timeout: Duration,
}

impl HttpReachabilityProbe {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            candidates: DEFAULT_CANDIDATES.iter().map(|s| s.to_string()).collect(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_candidates(mut self, candidates: Vec<String>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    async fn interface_address(&self, interface: &str) -> Result<IpAddr, Error> {
        let command = format!("ip -4 addr show {interface}");
        let output = self.runner.run(&command, Duration::from_secs(5)).await?;
        parse_inet_address(&output.stdout).ok_or(Error::NoInterfaceAddress)
    }
}

fn parse_inet_address(stdout: &str) -> Option<IpAddr> {
    for token in stdout.split_whitespace().collect::<Vec<_>>().windows(2) {
        if token[0] == "inet" {
            let addr = token[1].split('/').next()?;
            return addr.parse().ok();
        }
    }
    None
}

#[async_trait]
impl ReachabilityProbe for HttpReachabilityProbe {
    async fn probe(&self, slot: Slot) -> Result<bool, Error> {
        let interface = slot.interface();
        let local_addr = match self.interface_address(interface).await {
            Ok(addr) => addr,
            Err(err) => {
                tracing::warn!(interface, ?err, "probe could not determine interface address");
                return Ok(false);
            }
        };

        let client = match reqwest::Client::builder()
            .local_address(local_addr)
            .timeout(self.request_timeout)
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                tracing::error!(interface, %err, "failed to build probe HTTP client");
                return Ok(false);
            }
        };

        for url in &self.candidates {
            match client.get(url).send().await {
                Ok(resp) => match resp.text().await {
                    Ok(body) if !body.trim().is_empty() => {
                        tracing::info!(interface, url, "reachability probe passed");
                        return Ok(true);
                    }
                    _ => continue,
                },
                Err(err) => {
                    tracing::debug!(interface, url, %err, "probe candidate failed");
                    continue;
                }
            }
        }

        tracing::error!(interface, "reachability probe failed against all candidates");
        Ok(false)
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MockProbe {
        results: Mutex<HashMap<&'static str, bool>>,
    }

    impl MockProbe {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set(&self, slot: Slot, pass: bool) {
            self.results.lock().unwrap().insert(slot.interface(), pass);
        }
    }

    #[async_trait]
    impl ReachabilityProbe for MockProbe {
        async fn probe(&self, slot: Slot) -> Result<bool, Error> {
            Ok(*self.results.lock().unwrap().get(slot.interface()).unwrap_or(&true))
        }
    }
}
