pub mod cli;
pub mod http;

pub use cli::{Cli, CliError, CliHandler, Commands};
pub use http::{create_router, ApiError, ApiServer, AppState, ControlResponse, EventsResponse, HealthResponse, StatusResponse};
