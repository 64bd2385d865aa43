pub use config::*;
pub use counter::*;
pub use meter::*;
pub use snapshot::*;
pub use window::*;

mod config;
mod counter;
mod meter;
mod snapshot;
mod window;
