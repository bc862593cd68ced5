// Core engine components
pub mod query_parser;
pub mod query_compiler;
pub mod dispatcher;
pub mod agent;
pub mod shutdown;

pub use query_compiler::*;
pub use dispatcher::*;
pub use agent::*;
pub use shutdown::*;
