// Controller transport
pub mod controller_trait;
pub mod http_controller;

pub use controller_trait::*;
pub use http_controller::*;
