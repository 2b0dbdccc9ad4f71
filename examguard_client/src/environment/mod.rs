pub mod detector;
pub mod events;

pub use detector::*;
pub use events::*;
