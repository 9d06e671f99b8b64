//! KleptoSyn synthesis engine.
//!
//! Generates labeled investigative graphs: a sampled population of people
//! and organizations, tradecraft motifs bound onto it without structural
//! conflicts, background noise, and a time-ordered transaction log that
//! honours each motif's timing and amount semantics.
//!
//! ```text
//! EntitySampler -> MotifInstantiator -> NetworkAssembler -> TransactionSimulator -> serializer
//! ```
//!
//! A run is a pure function of its [`SynthConfig`] (seed included).

pub mod assembler;
pub mod config;
pub mod entity;
pub mod error;
pub mod graph;
pub mod instance;
pub mod instantiator;
pub mod money;
mod names;
pub mod pipeline;
pub mod pool;
pub mod report;
pub mod rng;
pub mod sampler;
pub mod serializer;
pub mod simulator;
pub mod vocabulary;

pub use config::{
    BackgroundConfig, BackgroundRelation, Condition, CorrelationRule, CountryShare,
    KindDistribution, MotifRequest, PopulationConfig, ReusePolicy, SelectionPolicy, SynthConfig,
    TemporalConfig, TimeWindow,
};
pub use entity::{Entity, EntityId};
pub use error::{
    ConfigurationError, InsufficientPopulationError, IntegrityViolationError, Result, SynthError,
    TemporalConstraintError,
};
pub use graph::{Graph, GraphEdge, GraphNode, NodeMetrics};
pub use instance::{ConcreteEdge, MotifInstance, Origin, RoleBinding};
pub use money::{Amount, RoundingConfig, RoundingMode};
pub use pipeline::{Generation, Generator, OutputPaths};
pub use report::{DropReason, DroppedInstance, GenerationReport};
pub use serializer::{EventRecord, NodeLinkGraph};
pub use simulator::{EventLog, TransactionEvent};
pub use vocabulary::{TermSet, Vocabulary, VocabularyConfig};
