pub mod aggregate;
pub mod aliases;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod normalize;
pub mod outcome;
pub mod query;
pub mod records;
pub mod schema;
pub mod source;
pub mod window;

pub use aggregate::{AggregateRow, Aggregation, Standing, Tally};
pub use aliases::{AliasKind, AliasTable};
pub use config::EngineConfig;
pub use engine::{Analysis, AnalysisRequest, PipelineReport, analyze, analyze_many};
pub use metrics::{MetricName, MetricValue, Strategy};
pub use query::{MetricStore, Query, QueryResult, SortKey};
pub use records::{EntityKind, Identity, RawRow, RowKind};
pub use window::Window;
