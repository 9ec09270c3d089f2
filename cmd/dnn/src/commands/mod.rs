//! CLI commands module.

mod info;
mod models;
mod run;
mod util;

pub use info::InfoCommand;
pub use models::ModelsCommand;
pub use run::RunCommand;

pub(crate) use util::*;
