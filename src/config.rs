//! Configuration types for usergrid-migrate
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Source/target endpoint files (JSON)
//! - Runtime configuration with validation

use crate::error::ConfigError;
use crate::mapping::MappingTable;
use crate::store::Credentials;
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Default page size when the endpoint file does not give one
const DEFAULT_PAGE_LIMIT: usize = 100;

/// Allow-list entry that matches every name
pub const WILDCARD: &str = "*";

/// Copy entities between Usergrid-style stores, renaming orgs, apps and collections
#[derive(Parser, Debug, Clone)]
#[command(
    name = "usergrid-migrate",
    version,
    about = "Copy entities between Usergrid-style stores",
    long_about = "Enumerates every application and collection of a source org and recreates\n\
                  each entity in a target store, optionally renaming the org, applications\n\
                  and collections on the way. Writes are idempotent, so a run can be repeated.",
    after_help = "EXAMPLES:\n    \
        usergrid-migrate -o red -a '*'\n    \
        usergrid-migrate -o red -a shop -c users -c orders -w 8\n    \
        usergrid-migrate -o red --map-org red:blue --map-collection cats:dogs\n    \
        usergrid-migrate -o red -s prod.json -d staging.json --ql \"select * where active = true\""
)]
pub struct CliArgs {
    /// Name of the org to migrate
    #[arg(short = 'o', long, value_name = "ORG")]
    pub org: String,

    /// Application to include (can be repeated, '*' for all)
    #[arg(short = 'a', long = "app", value_name = "APP", action = clap::ArgAction::Append)]
    pub apps: Vec<String>,

    /// Collection to include (can be repeated, omit for all)
    #[arg(short = 'c', long = "collection", value_name = "NAME", action = clap::ArgAction::Append)]
    pub collections: Vec<String>,

    /// Endpoint/credentials file for the source
    #[arg(short = 's', long, default_value = "source.json", value_name = "FILE")]
    pub source_config: PathBuf,

    /// Endpoint/credentials file for the target
    #[arg(short = 'd', long = "target-config", default_value = "destination.json", value_name = "FILE")]
    pub target_config: PathBuf,

    /// Number of worker threads
    #[arg(short = 'w', long, default_value = "1", value_name = "NUM")]
    pub workers: usize,

    /// Query used to select entities in every collection
    #[arg(long, default_value = "select *", value_name = "QL")]
    pub ql: String,

    /// Put data from app A into app B, as 'A:B' (can be repeated)
    #[arg(long = "map-app", value_name = "A:B", action = clap::ArgAction::Append)]
    pub map_app: Vec<String>,

    /// Put data from collection A into collection B in every app, as 'A:B' (can be repeated)
    #[arg(long = "map-collection", value_name = "A:B", action = clap::ArgAction::Append)]
    pub map_collection: Vec<String>,

    /// Put data from org A into org B, as 'A:B' (can be repeated)
    #[arg(long = "map-org", value_name = "A:B", action = clap::ArgAction::Append)]
    pub map_org: Vec<String>,

    /// Seconds a worker waits for an item before counting an empty poll
    #[arg(long, default_value = "10", value_name = "SECS")]
    pub queue_timeout: u64,

    /// Consecutive empty polls after which a worker stops
    #[arg(long, default_value = "1", value_name = "NUM")]
    pub max_empty_count: u32,

    /// Bound the number of queued items (unbounded if not set)
    #[arg(long, value_name = "NUM")]
    pub queue_capacity: Option<usize>,

    /// Seconds between checks for running workers once publishing is done
    #[arg(long, default_value = "3", value_name = "SECS")]
    pub wait_interval: u64,

    /// Verbose output
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Connection details for one store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(alias = "apiUrl")]
    pub api_url: String,

    /// Page size for collection queries
    #[serde(default = "default_page_limit")]
    pub limit: usize,

    /// Any extra keys present in the config file
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_page_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

impl EndpointConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            limit: DEFAULT_PAGE_LIMIT,
            extra: Map::new(),
        }
    }
}

/// Contents of a source or target JSON file
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointFile {
    pub endpoint: EndpointConfig,

    /// Credentials keyed by org name
    #[serde(default)]
    pub credentials: HashMap<String, Credentials>,
}

impl EndpointFile {
    /// Read and validate an endpoint file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let file: EndpointFile =
            serde_json::from_str(&text).map_err(|e| ConfigError::ParseFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if file.endpoint.limit == 0 {
            return Err(ConfigError::InvalidPageLimit {
                path: path.to_path_buf(),
                limit: 0,
            });
        }

        Ok(file)
    }

    /// Select the side of a migration that belongs to `org`
    ///
    /// A missing credential is not fatal: the store is then used without
    /// authenticating.
    pub fn side_for(&self, org: &str, label: &str) -> StoreSide {
        let credentials = self.credentials.get(org).cloned();
        if credentials.is_none() {
            warn!(side = label, org = org, "No credentials configured for org, continuing unauthenticated");
        }

        StoreSide {
            org: org.to_string(),
            endpoint: self.endpoint.clone(),
            credentials,
        }
    }
}

/// One end of the migration: which org, where, and how to log in
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSide {
    pub org: String,
    pub endpoint: EndpointConfig,
    pub credentials: Option<Credentials>,
}

/// Names to include; empty or containing `*` includes everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    names: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Allow-list that includes every name
    pub fn all() -> Self {
        Self::default()
    }

    pub fn allows(&self, name: &str) -> bool {
        self.includes_all() || self.names.contains(name)
    }

    pub fn includes_all(&self) -> bool {
        self.names.is_empty() || self.names.contains(WILDCARD)
    }
}

/// Validated runtime configuration
///
/// Built once at startup and shared read-only by every component.
#[derive(Debug, Clone)]
pub struct MigrateConfig {
    /// Source org
    pub org: String,

    /// Applications to migrate
    pub apps: AllowList,

    /// Collections to migrate
    pub collections: AllowList,

    /// Number of worker threads
    pub worker_count: usize,

    /// Query expression for every collection
    pub ql: String,

    /// How long a worker waits for one item
    pub queue_timeout: Duration,

    /// Empty polls that stop a worker
    pub max_empty_count: u32,

    /// Optional bound on queued items
    pub queue_capacity: Option<usize>,

    /// Interval between liveness checks while waiting for workers
    pub wait_interval: Duration,

    /// Name mappings for the target
    pub mapping: MappingTable,

    pub source: StoreSide,
    pub target: StoreSide,
}

impl MigrateConfig {
    /// Create and validate configuration from CLI arguments
    ///
    /// Reads both endpoint files; the target's credentials are looked up
    /// under the mapped org name.
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let source_file = EndpointFile::load(&args.source_config)?;
        let target_file = EndpointFile::load(&args.target_config)?;
        Self::from_parts(args, &source_file, &target_file)
    }

    /// Validate arguments against already-loaded endpoint files
    pub fn from_parts(
        args: CliArgs,
        source_file: &EndpointFile,
        target_file: &EndpointFile,
    ) -> Result<Self, ConfigError> {
        if args.workers == 0 || args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }

        if args.max_empty_count == 0 {
            return Err(ConfigError::InvalidMaxEmptyCount {
                count: args.max_empty_count,
            });
        }

        if args.queue_timeout == 0 {
            return Err(ConfigError::InvalidQueueTimeout {
                secs: args.queue_timeout,
            });
        }

        if let Some(0) = args.queue_capacity {
            return Err(ConfigError::InvalidQueueCapacity { capacity: 0 });
        }

        let mapping = MappingTable::from_pairs(&args.map_org, &args.map_app, &args.map_collection);
        let target_org = mapping.target_org(&args.org).to_string();

        let source = source_file.side_for(&args.org, "source");
        let target = target_file.side_for(&target_org, "target");

        Ok(Self {
            org: args.org,
            apps: AllowList::new(args.apps),
            collections: AllowList::new(args.collections),
            worker_count: args.workers,
            ql: args.ql,
            queue_timeout: Duration::from_secs(args.queue_timeout),
            max_empty_count: args.max_empty_count,
            queue_capacity: args.queue_capacity,
            wait_interval: Duration::from_secs(args.wait_interval.max(1)),
            mapping,
            source,
            target,
        })
    }

    /// Page size used when querying the source
    pub fn page_limit(&self) -> usize {
        self.source.endpoint.limit
    }
}
