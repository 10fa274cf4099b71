pub(crate) mod error;
pub(crate) mod orchestrator;
pub(crate) mod registry;

pub(crate) use error::SessionError;
pub(crate) use orchestrator::{Actor, Orchestrator};
pub(crate) use registry::SessionRegistry;
