pub mod api;
pub mod logger;
pub mod reporter;

pub use api::*;
pub use logger::*;
