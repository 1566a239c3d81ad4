//! Reads the environment variables from `# 6` into a typed [`Config`]: `RANK`,
//! `HOSTLIST`, `LOCAL`, `WORKERS_PER_HOST`, `BLOCK_SIZE`, `MEM_LIMIT`.

use std::net::{SocketAddr, ToSocketAddrs};

use crate::Error;

/// Default block size (`# 6`): 16 KiB.
pub const DEFAULT_BLOCK_SIZE: usize = 16 * 1024;

/// Default soft cap on a host's `BlockPool`, chosen generously enough that
/// a default-sized job does not spill by accident.
pub const DEFAULT_MEM_LIMIT: usize = 256 * 1024 * 1024;

/// One host's share of the job: its rank, the full host list, and the
/// per-host tuning knobs from `# 6`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub rank: usize,
    pub hosts: Vec<SocketAddr>,
    pub workers_per_host: usize,
    pub block_size: usize,
    pub mem_limit: usize,
}

impl Config {
    pub fn num_hosts(&self) -> usize {
        self.hosts.len()
    }

    fn validate(self) -> Result<Self, Error> {
        if self.rank >= self.hosts.len() {
            return Err(Error::RankOutOfRange {
                rank: self.rank,
                num_hosts: self.hosts.len(),
            });
        }
        if !self.block_size.is_power_of_two() || self.block_size < 1024 {
            return Err(Error::InvalidBlockSize(self.block_size));
        }
        Ok(self)
    }
}

/// The two ways a job can be bootstrapped, per `# 6`'s `LOCAL` variable:
/// connect to a real, externally-coordinated cluster, or spin up a
/// single-process mesh of simulated hosts for tests and demos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    Distributed(Config),
    /// One [`Config`] per simulated host, all bound to loopback.
    Local(Vec<Config>),
}

impl Topology {
    /// Resolve a [`Topology`] from the process environment.
    ///
    /// If `LOCAL` is set (and `RANK`/`HOSTLIST` are not required), builds a
    /// loopback mesh of that many simulated hosts. Otherwise requires `RANK`
    /// and `HOSTLIST` and validates the rank is in range.
    pub fn from_env() -> Result<Self, Error> {
        if let Ok(raw) = std::env::var("LOCAL") {
            let num_hosts = parse_usize("LOCAL", &raw)?;
            let workers_per_host = env_usize_or("WORKERS_PER_HOST", default_workers())?;
            let block_size = env_usize_or("BLOCK_SIZE", DEFAULT_BLOCK_SIZE)?;
            let mem_limit = env_usize_or("MEM_LIMIT", DEFAULT_MEM_LIMIT)?;
            return Ok(Self::Local(local_configs(
                num_hosts,
                workers_per_host,
                block_size,
                mem_limit,
            )?));
        }

        let rank = env_usize("RANK")?;
        let hostlist = std::env::var("HOSTLIST").map_err(|_| Error::MissingEnv("HOSTLIST"))?;
        let hosts = parse_hostlist(&hostlist)?;
        let workers_per_host = env_usize_or("WORKERS_PER_HOST", default_workers())?;
        let block_size = env_usize_or("BLOCK_SIZE", DEFAULT_BLOCK_SIZE)?;
        let mem_limit = env_usize_or("MEM_LIMIT", DEFAULT_MEM_LIMIT)?;

        let config = Config {
            rank,
            hosts,
            workers_per_host,
            block_size,
            mem_limit,
        }
        .validate()?;
        Ok(Self::Distributed(config))
    }
}

/// Build `num_hosts` [`Config`]s bound to consecutive loopback ports, one
/// per simulated host, for the `LOCAL` single-process bootstrap.
pub fn local_configs(
    num_hosts: usize,
    workers_per_host: usize,
    block_size: usize,
    mem_limit: usize,
) -> Result<Vec<Config>, Error> {
    if !block_size.is_power_of_two() || block_size < 1024 {
        return Err(Error::InvalidBlockSize(block_size));
    }
    // Port 0 would have the kernel pick a free one, but every simulated
    // host needs to know every *other* host's address up front (the Group
    // handshake dials by address, it does not discover ports), so ports are
    // fixed relative to a base in the ephemeral range instead.
    const BASE_PORT: u16 = 22_700;
    let hosts: Vec<SocketAddr> = (0..num_hosts)
        .map(|i| format!("127.0.0.1:{}", BASE_PORT + (i as u16) * 2).parse().unwrap())
        .collect();
    Ok((0..num_hosts)
        .map(|rank| Config {
            rank,
            hosts: hosts.clone(),
            workers_per_host,
            block_size,
            mem_limit,
        })
        .collect())
}

pub(crate) fn default_workers() -> usize {
    num_cpus::get()
}

/// Build and validate a [`Config`] for a real (non-`LOCAL`) cluster,
/// shared by [`Topology::from_env`] and the CLI's override path.
pub(crate) fn build_distributed(
    rank: usize,
    hostlist: &str,
    workers_per_host: usize,
    block_size: usize,
    mem_limit: usize,
) -> Result<Config, Error> {
    let hosts = parse_hostlist(hostlist)?;
    Config {
        rank,
        hosts,
        workers_per_host,
        block_size,
        mem_limit,
    }
    .validate()
}

fn parse_usize(name: &'static str, raw: &str) -> Result<usize, Error> {
    raw.parse().map_err(|e: std::num::ParseIntError| Error::InvalidEnv {
        name,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn env_usize(name: &'static str) -> Result<usize, Error> {
    let raw = std::env::var(name).map_err(|_| Error::MissingEnv(name))?;
    parse_usize(name, &raw)
}

fn env_usize_or(name: &'static str, default: usize) -> Result<usize, Error> {
    match std::env::var(name) {
        Ok(raw) => parse_usize(name, &raw),
        Err(_) => Ok(default),
    }
}

/// Split on commas and/or whitespace, then parse each `host:port` entry.
fn parse_hostlist(raw: &str) -> Result<Vec<SocketAddr>, Error> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(parse_endpoint)
        .collect()
}

fn parse_endpoint(entry: &str) -> Result<SocketAddr, Error> {
    if let Ok(addr) = entry.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if !entry.contains(':') {
        return Err(Error::MissingPort(entry.to_string()));
    }
    entry
        .to_socket_addrs()
        .map_err(|e| Error::BadHostEntry(entry.to_string(), e.to_string()))?
        .next()
        .ok_or_else(|| Error::BadHostEntry(entry.to_string(), "no addresses resolved".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_and_whitespace_separated_hostlist() {
        let hosts = parse_hostlist("127.0.0.1:9000, 127.0.0.1:9001\n127.0.0.1:9002").unwrap();
        assert_eq!(hosts.len(), 3);
        assert_eq!(hosts[1].port(), 9001);
    }

    #[test]
    fn rejects_entry_with_no_port() {
        let err = parse_endpoint("127.0.0.1").unwrap_err();
        assert!(matches!(err, Error::MissingPort(_)));
    }

    #[test]
    fn local_configs_share_the_same_hostlist() {
        let configs = local_configs(4, 2, DEFAULT_BLOCK_SIZE, DEFAULT_MEM_LIMIT).unwrap();
        assert_eq!(configs.len(), 4);
        for (rank, config) in configs.iter().enumerate() {
            assert_eq!(config.rank, rank);
            assert_eq!(config.hosts.len(), 4);
            assert_eq!(config.workers_per_host, 2);
        }
    }

    #[test]
    fn rejects_non_power_of_two_block_size() {
        let err = local_configs(2, 1, 1000, DEFAULT_MEM_LIMIT).unwrap_err();
        assert!(matches!(err, Error::InvalidBlockSize(1000)));
    }
}
