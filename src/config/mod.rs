//! Hierarchical configuration loading and resolution.

mod bind;
mod builder;
mod chain;
mod error;
mod file;
mod merge;
mod overrides;
mod resolve;
mod source;
mod tree;

pub use bind::{bind, validate, BindError};
pub use builder::Config;
pub use chain::{resolve_chain, ConfigChain, CyclePolicy, PARENT_FILE_KEY, PARENT_URL_KEY};
pub use error::{ConfigError, ConfigErrorBuilder, ErrorKind, Location};
pub use file::{load_document, parse_document, Format};
pub use merge::{merge, merge_chain};
pub use overrides::{apply_override, OverrideError, Overrides};
pub use resolve::{collect_bindings, resolve_variables, BindingTable};
pub use source::{DefaultSourceProvider, Origin, SourceProvider};
pub use tree::{Document, Map, Node, Scalar};
