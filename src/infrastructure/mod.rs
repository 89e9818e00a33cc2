pub mod abi;
pub mod chain_client;
pub mod logging;
pub mod request_gate;

pub use chain_client::{
    ChainReader, ContractCall, EnsNameResolver, EthersChainReader, LocalKeyWallet, NameResolver,
    TxOutcome, WalletProvider,
};
pub use request_gate::{FieldState, GateOutcome, RequestGate, Ticket};
