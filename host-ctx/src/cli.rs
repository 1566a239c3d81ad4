//! A `structopt`-based CLI layered over the environment-driven [`Config`]
//! (`# 10.3`), following the grounding codebase's `node-lib` convention of
//! `structopt` args with `env` fallbacks rather than reading `std::env`
//! directly in the binary.

use structopt::StructOpt;

use crate::config::{self, Topology, DEFAULT_BLOCK_SIZE, DEFAULT_MEM_LIMIT};
use crate::Error;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "host-ctx",
    about = "Distributed batch dataflow execution substrate: per-host wiring of the network group, dispatcher, streams, and reduce tables."
)]
pub struct Opt {
    /// This host's rank in `[0, num_hosts)`. Required unless `--local` is
    /// given.
    #[structopt(long, env = "RANK")]
    pub rank: Option<usize>,

    /// Comma- or whitespace-separated `host:port` endpoints, one per host.
    /// Required unless `--local` is given.
    #[structopt(long, env = "HOSTLIST")]
    pub hostlist: Option<String>,

    /// Spawn a single-process mesh of this many simulated hosts instead of
    /// connecting to a real cluster (for tests and demos).
    #[structopt(long, env = "LOCAL")]
    pub local: Option<usize>,

    /// Worker threads per host. Defaults to the number of logical CPUs.
    #[structopt(long, env = "WORKERS_PER_HOST")]
    pub workers_per_host: Option<usize>,

    /// Block size in bytes; must be a power of two, at least 1 KiB.
    #[structopt(long, env = "BLOCK_SIZE")]
    pub block_size: Option<usize>,

    /// Soft cap on a host's `BlockPool`, in bytes.
    #[structopt(long, env = "MEM_LIMIT")]
    pub mem_limit: Option<usize>,
}

impl Opt {
    /// Resolve this [`Opt`] (CLI args, `env` fallbacks already applied by
    /// `structopt`) into a [`Topology`].
    pub fn resolve(&self) -> Result<Topology, Error> {
        let workers_per_host = self.workers_per_host.unwrap_or_else(config::default_workers);
        let block_size = self.block_size.unwrap_or(DEFAULT_BLOCK_SIZE);
        let mem_limit = self.mem_limit.unwrap_or(DEFAULT_MEM_LIMIT);

        if let Some(num_hosts) = self.local {
            return Ok(Topology::Local(config::local_configs(
                num_hosts,
                workers_per_host,
                block_size,
                mem_limit,
            )?));
        }

        let rank = self.rank.ok_or(Error::MissingEnv("RANK"))?;
        let hostlist = self.hostlist.as_deref().ok_or(Error::MissingEnv("HOSTLIST"))?;
        let config = config::build_distributed(rank, hostlist, workers_per_host, block_size, mem_limit)?;
        Ok(Topology::Distributed(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_flag_wins_over_unset_rank_and_hostlist() {
        let opt = Opt {
            rank: None,
            hostlist: None,
            local: Some(3),
            workers_per_host: Some(2),
            block_size: None,
            mem_limit: None,
        };
        match opt.resolve().unwrap() {
            Topology::Local(configs) => assert_eq!(configs.len(), 3),
            Topology::Distributed(_) => panic!("expected Local"),
        }
    }

    #[test]
    fn missing_rank_and_hostlist_without_local_is_an_error() {
        let opt = Opt {
            rank: None,
            hostlist: None,
            local: None,
            workers_per_host: None,
            block_size: None,
            mem_limit: None,
        };
        assert!(opt.resolve().is_err());
    }
}
