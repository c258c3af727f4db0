pub mod traits;
pub mod normalizer;
pub mod paper;
pub mod prelude;

pub use traits::*;
pub use normalizer::*;
pub use paper::*;
