//! End-to-end generation: sample, instantiate, assemble, simulate.

use crate::assembler::NetworkAssembler;
use crate::config::SynthConfig;
use crate::error::{Result, SynthError};
use crate::graph::Graph;
use crate::instance::MotifInstance;
use crate::instantiator::MotifInstantiator;
use crate::pool::EntityPool;
use crate::report::GenerationReport;
use crate::rng::{stream_rng, SAMPLER_STREAM};
use crate::sampler::EntitySampler;
use crate::serializer::{write_events_jsonl, write_transactions_tsv, GraphMeta, NodeLinkGraph};
use crate::simulator::{EventLog, TransactionSimulator};
use kleptosyn_motif::{LibraryError, MotifLibrary};
use std::path::{Path, PathBuf};

pub const GRAPH_FILE: &str = "graph.json";
pub const EVENTS_FILE: &str = "events.jsonl";
pub const TRANSACTIONS_FILE: &str = "transact.tsv";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Everything one run produces.
#[derive(Debug, Clone)]
pub struct Generation {
    pub graph: Graph,
    pub instances: Vec<MotifInstance>,
    pub events: EventLog,
    pub report: GenerationReport,
}

/// Paths written by [`Generator::write_outputs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub graph: PathBuf,
    pub events: PathBuf,
    pub transactions: PathBuf,
    pub manifest: PathBuf,
}

impl OutputPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            graph: dir.join(GRAPH_FILE),
            events: dir.join(EVENTS_FILE),
            transactions: dir.join(TRANSACTIONS_FILE),
            manifest: dir.join(MANIFEST_FILE),
        }
    }
}

pub struct Generator {
    config: SynthConfig,
    library: MotifLibrary,
}

impl Generator {
    /// Inline templates from the config are added to `library`, shadowing
    /// entries of the same name; then the whole config is validated.
    pub fn new(config: SynthConfig, mut library: MotifLibrary) -> Result<Self> {
        for template in &config.templates {
            library
                .replace(template.clone())
                .map_err(|err| match err {
                    LibraryError::Definition(def) => SynthError::MotifDefinition(def),
                    other => other.into(),
                })?;
        }
        config.validate(&library)?;
        Ok(Self { config, library })
    }

    /// Built-in catalog plus inline templates.
    pub fn from_config(config: SynthConfig) -> Result<Self> {
        Self::new(config, MotifLibrary::builtin()?)
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    pub fn library(&self) -> &MotifLibrary {
        &self.library
    }

    pub fn run(&self) -> Result<Generation> {
        let config = &self.config;
        tracing::info!(seed = config.seed, requests = config.motifs.len(), "starting generation");

        let sampler = EntitySampler::new(&config.population, &config.vocabulary)?;
        let entities = sampler.sample(&mut stream_rng(config.seed, SAMPLER_STREAM));
        tracing::info!(entities = entities.len(), "sampled entities");

        let pool = EntityPool::new(entities);
        let instantiation = MotifInstantiator::new(&self.library, &pool, config).run()?;

        let graph = NetworkAssembler::new(config)
            .assemble(pool.into_entities(), &instantiation.instances)?;

        let events = TransactionSimulator::new(&self.library, config.rounding)
            .simulate(&instantiation.instances, &graph)?;

        let report = GenerationReport::build(
            config.seed,
            &config.motifs,
            &instantiation.instances,
            &instantiation.dropped,
            &graph,
            &events,
        );
        tracing::info!(
            requested = report.requested(),
            achieved = report.achieved(),
            dropped = report.dropped.len(),
            "generation finished"
        );

        Ok(Generation {
            graph,
            instances: instantiation.instances,
            events,
            report,
        })
    }

    pub fn graph_meta(&self) -> GraphMeta {
        GraphMeta {
            name: "kleptosyn".to_string(),
            seed: self.config.seed,
            generator: format!("kleptosyn {}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Write graph, event log, TSV export and manifest into `dir`.
    pub fn write_outputs(&self, generation: &Generation, dir: &Path) -> Result<OutputPaths> {
        std::fs::create_dir_all(dir).map_err(|e| SynthError::io(dir, e))?;
        let paths = OutputPaths::in_dir(dir);

        NodeLinkGraph::from_graph(&generation.graph, self.graph_meta()).write(&paths.graph)?;
        write_events_jsonl(&generation.events, &self.config.rounding, &paths.events)?;
        write_transactions_tsv(
            &generation.events,
            &generation.graph,
            &self.config.rounding,
            &paths.transactions,
        )?;
        let manifest = serde_json::to_string_pretty(&generation.report)?;
        std::fs::write(&paths.manifest, manifest + "\n")
            .map_err(|e| SynthError::io(&paths.manifest, e))?;

        tracing::info!(dir = %dir.display(), "wrote outputs");
        Ok(paths)
    }
}
