//! Control files: parsing and value coercion

pub mod parser;
pub mod value;

pub use parser::{control_file_digest, parse_control_file, ControlFile, ControlFileEntry, Diagnostic};
pub use value::ParamValue;
