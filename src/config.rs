//! Resolver configuration.
//!
//! Values come from the process environment. The binary loads `.env`
//! files through `dotenv-flow` first, so either source works.

use std::time::Duration;

use url::Url;

use crate::error::ResolutionError;
use crate::txref::Chain;
use crate::types::ResolutionOptions;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Connection details for one JSON-RPC node
#[derive(Debug, Clone, PartialEq)]
pub struct RpcEndpoint {
    pub url: Url,
    pub username: String,
    pub password: String,
}

/// Everything needed to build a [`Resolver`](crate::Resolver) against live nodes
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Network whose TxRef prefix DID suffixes are read under
    pub network: Chain,
    /// Bitcoin Core node backing `did:mdip:btc-` identifiers
    pub btc: RpcEndpoint,
    /// Omni Core node backing `did:mdip:omni-` identifiers
    pub omni: Option<RpcEndpoint>,
    /// Upper bound on blocks the continuation walker may fetch
    pub max_blocks: Option<u64>,
    /// Deadline for one whole resolution
    pub timeout: Duration,
}

impl ResolverConfig {
    /// Reads the configuration from environment variables
    pub fn from_env() -> Result<Self, ResolutionError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ResolutionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let network = match non_empty(&lookup, "MDIP_NETWORK") {
            Some(network) => network
                .parse()
                .map_err(|_| ResolutionError::InvalidConfig("MDIP_NETWORK".to_string()))?,
            None => Chain::Testnet,
        };

        let btc = endpoint(&lookup, "BTC")?
            .ok_or_else(|| ResolutionError::MissingConfig("BTC_URL".to_string()))?;
        let omni = endpoint(&lookup, "OMNI")?;

        let max_blocks = non_empty(&lookup, "MDIP_MAX_BLOCKS")
            .map(|value| parse_number(&value, "MDIP_MAX_BLOCKS"))
            .transpose()?;

        let timeout = non_empty(&lookup, "MDIP_TIMEOUT_SECS")
            .map(|value| parse_number(&value, "MDIP_TIMEOUT_SECS"))
            .transpose()?
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Self {
            network,
            btc,
            omni,
            max_blocks,
            timeout: Duration::from_secs(timeout),
        })
    }

    /// Resolution options carrying this configuration's limits
    pub fn resolution_options(&self) -> ResolutionOptions {
        ResolutionOptions {
            timeout: Some(self.timeout),
            max_blocks: self.max_blocks,
        }
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|value| !value.trim().is_empty())
}

fn parse_number(value: &str, key: &str) -> Result<u64, ResolutionError> {
    value
        .trim()
        .parse()
        .map_err(|_| ResolutionError::InvalidConfig(key.to_string()))
}

/// `<PREFIX>_URL`, `<PREFIX>_USERNAME`, `<PREFIX>_PASSWORD`; absent when the URL is unset
fn endpoint<F>(lookup: &F, prefix: &str) -> Result<Option<RpcEndpoint>, ResolutionError>
where
    F: Fn(&str) -> Option<String>,
{
    let url_key = format!("{prefix}_URL");
    let Some(url) = non_empty(lookup, &url_key) else {
        return Ok(None);
    };

    let require = |suffix: &str| {
        let key = format!("{prefix}_{suffix}");
        non_empty(lookup, &key).ok_or(ResolutionError::MissingConfig(key))
    };

    Ok(Some(RpcEndpoint {
        url: Url::parse(&url)?,
        username: require("USERNAME")?,
        password: require("PASSWORD")?,
    }))
}
