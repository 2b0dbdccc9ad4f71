pub mod service;
pub mod warnings;

pub use service::*;
pub use warnings::*;
