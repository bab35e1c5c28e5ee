pub mod chain;
pub mod status;
pub mod transaction;

pub use chain::*;
pub use status::*;
pub use transaction::*;
