//! Fitted mixture models: results, hypothesis comparison and persistence.

pub mod compare;
pub mod fit;
pub mod serialization;

pub use fit::MixtureFit;
