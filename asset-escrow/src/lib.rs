//! Custodial escrow for tradable assets
//!
//! A depositor hands an asset to the escrow's custody party, sets a price,
//! and either a buyer pays it (the depositor receives the value, the asset
//! stays held) or the depositor refunds the buyer afterwards. While no buyer
//! has paid, the depositor can take the asset back.
//!
//! The engine talks to the outside world through three seams:
//! - [`AssetCustodian`] for asset ownership and transfers
//! - [`ValueTransport`] for moving value between parties
//! - [`EventSink`] for publishing lifecycle events

pub mod config;
pub mod custodian;
pub mod error;
pub mod escrow_engine;
pub mod event_sink;
pub mod intake;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod node;
pub mod state_machine;
pub mod transport;

pub use config::{EscrowEngineConfig, EscrowNodeConfig, LoggingConfig};
pub use custodian::{AssetCustodian, CustodyReceiver, InMemoryCustodian};
pub use error::EscrowError;
pub use escrow_engine::EscrowEngine;
pub use event_sink::{EventLog, EventSink};
pub use models::{Amount, AssetId, EscrowEvent, EscrowRecord, EscrowState, EventRecord, PartyId};
pub use node::{EscrowInfo, EscrowNode, NodeHealth};
pub use transport::{InMemoryTransport, ValueTransport};

/// Result type alias for escrow operations
pub type EscrowResult<T> = Result<T, EscrowError>;
