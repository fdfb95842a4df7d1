pub mod migrate;
pub mod produce;
