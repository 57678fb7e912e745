pub mod config;
pub mod executor;
pub mod harvest;
pub mod kubectl;
pub mod migrate;
pub mod model;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

// Re-export common types for convenience
pub use config::*;
pub use executor::*;
pub use harvest::*;
pub use kubectl::*;
pub use migrate::*;
pub use model::*;
pub use traits::*;
