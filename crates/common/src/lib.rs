//! # Staker Common Crate
//!
//! Domain types and chain abstractions shared by the staking dashboard.
//!
//! ## Modules
//! - `types`: mirrored state, event records, write calls
//! - `amount`: exact decimal ⇄ smallest-unit conversion
//! - `contract`: collaborator traits (reader, writer, oracle, events)
//! - `config`: TOML configuration with environment overrides
//! - `simulated`: in-memory staking contract for tests and demos
//!
//! ## Collaborator Architecture
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ StakerReader · StakerWriter · GasPriceOracle │  <- traits
//! │ BalanceProvider · StakeEventSource           │
//! │ PriceFeed · NameResolver (display only)      │
//! └──────────────────────┬───────────────────────┘
//!                        │
//!              ┌─────────┴─────────┐
//!              │                   │
//!        ┌─────▼─────┐     ┌───────▼────────┐
//!        │ RPC client│     │SimulatedStaker │
//!        │ (external)│     │  (in-memory)   │
//!        └───────────┘     └────────────────┘
//! ```

pub mod amount;
pub mod config;
pub mod contract;
pub mod simulated;
pub mod types;

pub use amount::{
    format_ether, format_units, parse_ether, parse_nonzero_units, parse_units, AmountError,
    NATIVE_DECIMALS,
};
pub use config::{load_from_file, ConfigError, DashboardConfig, DEFAULT_FETCH_TIMEOUT_MS};
pub use contract::{
    BalanceProvider, ContractAddresses, ContractError, GasPriceOracle, GasTier, NameResolver,
    PriceFeed, StakeEventSource, StakeEventStream, StakerReader, StakerWriter, STAKE_EVENT,
};
pub use simulated::{ReadBehavior, SimulatedSigner, SimulatedStaker};
pub use types::{
    Address, Amount, ContractStateView, PendingTransaction, StakeEventRecord, StakerCall,
    StateField, TxHandle, TxReceipt, B256, U256,
};
