//! Command implementations for partix.

pub mod partition;
pub mod template;

pub use partition::{CommandError, PartitionCommand, PartitionSummary};
pub use template::TemplateCommand;
