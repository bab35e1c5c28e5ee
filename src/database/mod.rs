pub mod operations;
pub mod schema;


pub use operations::{Database, EventRow, WatermarkRow};
pub use schema::initialize_schema;
