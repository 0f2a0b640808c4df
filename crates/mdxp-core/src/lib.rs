#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod classify;
pub mod compiler;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod host;
pub mod imports;
pub mod markup;
pub mod pipeline;
pub mod resolver;
pub mod sandbox;
pub mod session;
pub mod version;

pub use classify::{classify, Classification, PayloadKind};
pub use compiler::{CompilerError, TranspileChain};
pub use config::{Config, PreviewConfig, SecurityPolicy};
pub use error::Error;
pub use fetcher::{
    codes, DependencySpecifier, EntryBuild, FetchError, Fetcher, ModuleRequest, ResolvedModule,
    NOOP_MODULE,
};
pub use host::{
    CollectingSink, LiveBuffers, MemoryBuffers, NoLiveBuffers, PreviewError, PreviewSink,
    SinkEvent,
};
pub use imports::{scan_dependencies, DependencyExtractor, ExtractedDependency, ScanExtractor};
pub use resolver::{
    resolve, ResolveContext, ResolveReasonCode, ResolveResult, ResolveStatus, ResolverConfig,
    SharedManifestCache, TsConfig,
};
pub use sandbox::{Sandbox, SandboxDecision};
pub use session::{Document, Language, Session, SessionSnapshot};
pub use version::VERSION;
