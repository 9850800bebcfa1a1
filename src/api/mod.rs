//! Exchange access: the gateway seam, the Gate.io futures client and the dry-run wrapper.

mod gateio;
pub mod gateway;
mod paper;

pub use gateio::{GateClient, GateConfig};
pub use gateway::{ExchangeGateway, OrderSide};
pub use paper::PaperGateway;
