use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::RpcError;
use crate::chains::Chain;
use crate::config::Network;

/// Consecutive failures on the current endpoint before the pool rotates.
pub const MAX_FAILURES: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcEndpoint {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub rate_limit: u32,
    #[serde(default = "default_healthy")]
    pub is_healthy: bool,
    #[serde(default)]
    pub last_check_timestamp: i64,
    #[serde(default)]
    pub failure_count: u32,
}

fn default_healthy() -> bool {
    true
}

impl RpcEndpoint {
    pub fn new(name: &str, url: &str, priority: u32, rate_limit: u32) -> Self {
        RpcEndpoint {
            name: name.to_string(),
            url: url.to_string(),
            priority,
            rate_limit,
            is_healthy: true,
            last_check_timestamp: 0,
            failure_count: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EndpointConfig {
    #[serde(default)]
    mainnet: HashMap<String, Vec<RpcEndpoint>>,
    #[serde(default)]
    testnet: HashMap<String, Vec<RpcEndpoint>>,
}

#[derive(Debug, Default)]
struct ChainEndpoints {
    endpoints: Vec<RpcEndpoint>,
    current: usize,
}

impl ChainEndpoints {
    fn new(mut endpoints: Vec<RpcEndpoint>) -> Self {
        // sort_by_key is stable: equal priorities keep file order
        endpoints.sort_by_key(|endpoint| endpoint.priority);
        ChainEndpoints {
            endpoints,
            current: 0,
        }
    }

    fn current(&self) -> Option<&RpcEndpoint> {
        self.endpoints.get(self.current)
    }

    /// Moves to the next healthy endpoint after the current one, wrapping around.
    /// The chosen endpoint starts over with zero failures. Returns false and
    /// leaves the index alone when no endpoint is healthy.
    fn rotate(&mut self) -> bool {
        let len = self.endpoints.len();
        for offset in 1..=len {
            let index = (self.current + offset) % len;
            if self.endpoints[index].is_healthy {
                self.current = index;
                self.endpoints[index].failure_count = 0;
                return true;
            }
        }
        false
    }
}

/// Per-chain ordered endpoint lists with failure counting and rotation.
///
/// All state sits behind one mutex so concurrent failure reports and
/// rotations are serialized.
pub struct EndpointPool {
    chains: Mutex<HashMap<Chain, ChainEndpoints>>,
}

impl Default for EndpointPool {
    fn default() -> Self {
        Self::with_defaults(Network::Mainnet)
    }
}

impl EndpointPool {
    pub fn empty() -> Self {
        EndpointPool {
            chains: Mutex::new(HashMap::new()),
        }
    }

    /// Built-in public endpoints for every chain on `network`.
    pub fn with_defaults(network: Network) -> Self {
        let pool = Self::empty();
        for chain in Chain::ALL {
            pool.set_endpoints(chain, default_endpoints(chain, network));
        }
        pool
    }

    /// Loads `{ "mainnet": { "<symbol>": [...] }, "testnet": {...} }`.
    ///
    /// Chains missing from the selected section fall back to the built-in
    /// defaults; unknown chain symbols are skipped.
    pub fn from_config_str(json: &str, network: Network) -> Result<Self, RpcError> {
        let config: EndpointConfig =
            serde_json::from_str(json).map_err(|e| RpcError::Config(e.to_string()))?;
        let section = match network {
            Network::Mainnet => config.mainnet,
            Network::Testnet => config.testnet,
        };

        let pool = Self::with_defaults(network);
        for (symbol, endpoints) in section {
            match symbol.parse::<Chain>() {
                Ok(chain) => pool.set_endpoints(chain, endpoints),
                Err(_) => warn!(chain = %symbol, "ignoring endpoints for unknown chain"),
            }
        }
        Ok(pool)
    }

    pub fn from_config_file<P: AsRef<Path>>(path: P, network: Network) -> Result<Self, RpcError> {
        let json = fs::read_to_string(path.as_ref())?;
        let pool = Self::from_config_str(&json, network)?;
        info!(path = %path.as_ref().display(), %network, "loaded RPC endpoint configuration");
        Ok(pool)
    }

    /// Replaces the endpoint list of `chain`, ordered by ascending priority.
    pub fn set_endpoints(&self, chain: Chain, endpoints: Vec<RpcEndpoint>) {
        self.chains.lock().insert(chain, ChainEndpoints::new(endpoints));
    }

    /// URL of the current endpoint, if the chain has any.
    pub fn get_endpoint(&self, chain: Chain) -> Option<String> {
        let chains = self.chains.lock();
        chains
            .get(&chain)
            .and_then(ChainEndpoints::current)
            .map(|endpoint| endpoint.url.clone())
    }

    pub fn current_endpoint(&self, chain: Chain) -> Option<RpcEndpoint> {
        let chains = self.chains.lock();
        chains.get(&chain).and_then(ChainEndpoints::current).cloned()
    }

    /// Counts a failure against the current endpoint, rotating after
    /// [`MAX_FAILURES`].
    pub fn report_failure(&self, chain: Chain, error: &str) {
        self.record_failure(chain, None, error);
    }

    /// Like [`EndpointPool::report_failure`], but only counts when `url` is
    /// still the current endpoint. A request that finishes after the pool
    /// has moved on does not charge the new endpoint.
    pub fn report_failure_for(&self, chain: Chain, url: &str, error: &str) {
        self.record_failure(chain, Some(url), error);
    }

    fn record_failure(&self, chain: Chain, url: Option<&str>, error: &str) {
        let mut chains = self.chains.lock();
        let Some(entry) = chains.get_mut(&chain) else {
            return;
        };
        let current = entry.current;
        let Some(endpoint) = entry.endpoints.get_mut(current) else {
            return;
        };
        if let Some(url) = url {
            if endpoint.url != url {
                debug!(%chain, url, "ignoring failure from a replaced endpoint");
                return;
            }
        }

        endpoint.failure_count += 1;
        endpoint.last_check_timestamp = Utc::now().timestamp_millis();
        warn!(
            %chain,
            endpoint = %endpoint.name,
            failures = endpoint.failure_count,
            error,
            "RPC failure"
        );

        if endpoint.failure_count >= MAX_FAILURES {
            let from = endpoint.name.clone();
            if entry.rotate() {
                if let Some(next) = entry.current() {
                    info!(%chain, from = %from, to = %next.name, "switched RPC endpoint");
                }
            } else {
                warn!(%chain, "no healthy RPC endpoint to switch to");
            }
        }
    }

    /// Advances to the next healthy endpoint. Returns false when none is healthy.
    pub fn switch_to_next_endpoint(&self, chain: Chain) -> bool {
        let mut chains = self.chains.lock();
        match chains.get_mut(&chain) {
            Some(entry) => entry.rotate(),
            None => false,
        }
    }

    /// Pins the endpoint whose URL equals `url`.
    pub fn set_endpoint(&self, chain: Chain, url: &str) -> bool {
        let mut chains = self.chains.lock();
        let Some(entry) = chains.get_mut(&chain) else {
            return false;
        };
        match entry.endpoints.iter().position(|endpoint| endpoint.url == url) {
            Some(index) => {
                entry.current = index;
                debug!(%chain, url, "pinned RPC endpoint");
                true
            }
            None => false,
        }
    }

    pub fn available_endpoints(&self, chain: Chain) -> Vec<RpcEndpoint> {
        let chains = self.chains.lock();
        chains
            .get(&chain)
            .map(|entry| entry.endpoints.clone())
            .unwrap_or_default()
    }

    /// Chain → name of its current endpoint.
    pub fn stats(&self) -> BTreeMap<Chain, String> {
        let chains = self.chains.lock();
        chains
            .iter()
            .filter_map(|(chain, entry)| entry.current().map(|ep| (*chain, ep.name.clone())))
            .collect()
    }

    pub fn mark_unhealthy(&self, chain: Chain, url: &str) -> bool {
        self.set_health(chain, url, false)
    }

    pub fn mark_healthy(&self, chain: Chain, url: &str) -> bool {
        self.set_health(chain, url, true)
    }

    fn set_health(&self, chain: Chain, url: &str, healthy: bool) -> bool {
        let mut chains = self.chains.lock();
        let Some(endpoint) = chains
            .get_mut(&chain)
            .and_then(|entry| entry.endpoints.iter_mut().find(|ep| ep.url == url))
        else {
            return false;
        };
        endpoint.is_healthy = healthy;
        endpoint.last_check_timestamp = Utc::now().timestamp_millis();
        debug!(%chain, url, healthy, "endpoint health updated");
        true
    }
}

fn default_endpoints(chain: Chain, network: Network) -> Vec<RpcEndpoint> {
    let endpoint = match (network, chain) {
        (Network::Mainnet, Chain::Bitcoin) => {
            RpcEndpoint::new("Blockstream", "https://blockstream.info/api", 1, 10)
        }
        (Network::Mainnet, Chain::Ethereum) => {
            RpcEndpoint::new("Cloudflare", "https://cloudflare-eth.com", 1, 100)
        }
        (Network::Mainnet, Chain::Tron) => {
            RpcEndpoint::new("TronGrid", "https://api.trongrid.io", 1, 100)
        }
        (Network::Mainnet, Chain::Solana) => RpcEndpoint::new(
            "Solana Mainnet",
            "https://api.mainnet-beta.solana.com",
            1,
            100,
        ),
        (Network::Testnet, Chain::Bitcoin) => RpcEndpoint::new(
            "Blockstream Testnet",
            "https://blockstream.info/testnet/api",
            1,
            10,
        ),
        (Network::Testnet, Chain::Ethereum) => {
            RpcEndpoint::new("Sepolia", "https://rpc.ankr.com/eth_sepolia", 1, 50)
        }
        (Network::Testnet, Chain::Tron) => {
            RpcEndpoint::new("Shasta", "https://api.shasta.trongrid.io", 1, 100)
        }
        (Network::Testnet, Chain::Solana) => {
            RpcEndpoint::new("Solana Devnet", "https://api.devnet.solana.com", 1, 100)
        }
    };
    vec![endpoint]
}
