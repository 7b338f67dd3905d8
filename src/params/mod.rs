//! Parameter stores built from control files and stage schemas

pub mod schema;
mod store;

pub use schema::{ReservedKind, StageSchema};
pub use store::{ParamSource, Parameter, ParameterStore};
