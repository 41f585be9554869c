//! # RefSeeker
//!
//! Cross-datastore schema relationship discovery: stage attribute values
//! from a heterogeneous set of data stores, enumerate unique attribute
//! combinations (UACs), search for inclusion dependencies (INDs), score
//! primary-key and foreign-key candidates, and emit a structured report.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Sources ({uri, user, password} tuples)
//!     |
//! [Ingest]         -> staged servers / databases / datastorages /
//!     |               attributes / value cells
//! [UAC Finder]     -> minimal unique attribute combinations
//!     |
//! [IND Finder]     -> unary + n-ary inclusion dependencies
//!     |               (optional: maximal INDs)
//! [PK Scorer]      -> cardinality / value length / position /
//!     |               name suffix / datatype components + categories
//! [FK Scorer]      -> name, distribution, IRIS, hybrid similarities
//!     |               + composite probabilities
//! [Selector]       -> primary keys, explicit / implicit references
//!     |
//! Report (JSON)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use refseeker::{Config, DiscoveryEngine, SourceSpec};
//!
//! let config = Config::load()?;
//! let mut engine = DiscoveryEngine::new(config)?;
//! let report = engine.discover(&[SourceSpec {
//!     uri: "csvfile:///data/northwind".into(),
//!     user: String::new(),
//!     password: String::new(),
//! }])?;
//! report.write_to(std::path::Path::new("result.json"))?;
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `config` | Hierarchical configuration (files + env) |
//! | `model` | Staged entities and value typing |
//! | `staging` | Query Interface + in-memory backend |
//! | `ingest` | Connector contract, file connectors, batch sink |
//! | `pipeline` | The five discovery stages + run coordination |
//! | `analyze` | Tokens, plateau detectors, buckets, lexical oracle |
//! | `report` | JSON report assembly |

pub mod analyze;
pub mod config;
pub mod error;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod staging;

pub use config::{Config, FkMetric, PkMetric};
pub use error::{DiscoveryError, DiscoveryResult, RunStatus};
pub use ingest::SourceSpec;
pub use pipeline::{CancelToken, RuntimeMetrics};
pub use report::Report;
pub use staging::{MemoryStaging, QueryInterface};

use std::time::Instant;

use tracing::{info, warn};

use analyze::{LexicalOracle, NullOracle};
use ingest::{connector_for, StagingSink};

/// Orchestrates a discovery run: purge, ingest, the five analytic stages,
/// and report assembly.
pub struct DiscoveryEngine {
    config: Config,
    staging: MemoryStaging,
    oracle: Box<dyn LexicalOracle>,
    cancel: CancelToken,
    status: Option<RunStatus>,
}

impl DiscoveryEngine {
    /// Create an engine with validated configuration and the default
    /// (empty) lexical oracle.
    pub fn new(config: Config) -> DiscoveryResult<Self> {
        config.validate()?;
        Ok(DiscoveryEngine {
            config,
            staging: MemoryStaging::new(),
            oracle: Box::new(NullOracle),
            cancel: CancelToken::new(),
            status: None,
        })
    }

    /// Swap in a lexical oracle for semantic token similarity.
    pub fn with_oracle(mut self, oracle: Box<dyn LexicalOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    /// Token the caller may use to cancel the run between stages.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Status of the most recent run.
    pub fn status(&self) -> Option<RunStatus> {
        self.status
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Direct access to the staged snapshot, e.g. for inspection after a run.
    pub fn staging(&self) -> &MemoryStaging {
        &self.staging
    }

    /// One full run over the given sources.
    pub fn discover(&mut self, sources: &[SourceSpec]) -> DiscoveryResult<Report> {
        let result = self.run(sources);
        self.status = Some(match &result {
            Ok(_) => RunStatus::Finished,
            Err(_) => RunStatus::Aborted,
        });
        result
    }

    fn run(&mut self, sources: &[SourceSpec]) -> DiscoveryResult<Report> {
        let mut metrics = RuntimeMetrics::new();

        // Each run starts from a clean staging store; leftover state from a
        // cancelled run is discarded here.
        self.staging.purge();

        let started = Instant::now();
        for source in sources {
            self.cancel.checkpoint()?;
            if let Err(e) = self.ingest_source(source) {
                // A dead source is skipped, not fatal.
                warn!(uri = %source.uri, error = %e, "skipping source");
            }
        }
        self.staging.finalize_ingest();
        metrics.record("time_ingest", started);
        info!(sources = sources.len(), "ingest finished");

        pipeline::run_stages(
            &mut self.staging,
            &self.config,
            self.oracle.as_ref(),
            &self.cancel,
            &mut metrics,
        )?;

        let report = Report::build(
            &self.staging,
            Some(metrics.into_map()),
            self.config.discovery.inclusion_dependencies.find_max_ind,
        )?;
        Ok(report)
    }

    fn ingest_source(&mut self, source: &SourceSpec) -> DiscoveryResult<()> {
        let connector = connector_for(source).map_err(|e| DiscoveryError::Ingest {
            uri: source.uri.clone(),
            message: e.to_string(),
        })?;
        let (host, port) = host_and_port(&source.uri);
        let mut sink = StagingSink::new(&mut self.staging, connector.kind(), &host, port);
        connector.load(&mut sink).map_err(|e| DiscoveryError::Ingest {
            uri: source.uri.clone(),
            message: e.to_string(),
        })
    }
}

/// Host and port for the staged server record. File-based URIs carry the
/// path as host and no port.
fn host_and_port(uri: &str) -> (String, u16) {
    let rest = uri.split_once("://").map_or(uri, |(_, rest)| rest);
    if let Some((host, port_part)) = rest.rsplit_once(':') {
        if let Ok(port) = port_part.split('/').next().unwrap_or("").parse::<u16>() {
            return (host.to_string(), port);
        }
    }
    (rest.to_string(), 0)
}
