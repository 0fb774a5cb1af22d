pub mod artifact;
pub use artifact::*;

pub mod cache;
pub use cache::*;

pub mod compiler;
pub use compiler::*;

pub mod coverage;
pub use coverage::*;

pub mod deployer;
pub use deployer::*;

pub mod instrument;
pub use instrument::*;

pub mod standard_json;
pub use standard_json::*;
