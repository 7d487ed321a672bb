pub mod pool;

pub use pool::{connect, Database};
