pub mod engine;
pub mod connectors;
pub mod protocol;
pub mod cli;
pub mod utils;

pub use engine::*;
pub use connectors::*;
pub use protocol::*;
pub use cli::*;
pub use utils::*;
