pub mod fit;
pub mod simulate;
pub mod summary;
