pub mod adapters;
pub mod currency;
pub mod endpoint_pool;
pub mod rpc_client;
pub mod transport;

pub use adapters::{build_adapter, ChainAdapter, CosmosAdapter, EvmAdapter, GenericAdapter, SubstrateAdapter};
pub use currency::{normalize_transaction, resolve_currency};
pub use endpoint_pool::{EndpointPool, EndpointState, PoolConfig};
pub use rpc_client::RpcClient;
pub use transport::ChainRpc;
