pub mod archive;
pub mod cli;
pub mod config;
pub mod emitters;
pub mod plugins;
pub mod report;
pub mod session;
pub mod util;

pub use archive::{Archive, ArchiveError, Compression};
pub use config::Config;
pub use emitters::{Engine, EnumeratorTable, KeySet, OutputRecord, Scope};
pub use plugins::{Plugin, PluginContext, PluginDescriptor, PluginError, PluginMeta, Selection};
pub use report::{ReportError, ReportOptions, ReportSummary, VmcoreReport};
pub use session::{ReadError, Session, SessionError};
