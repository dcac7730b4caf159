//! Per-connection session core
//!
//! One practice session multiplexes a client WebSocket and (in live mode) an
//! upstream live session onto a publish/subscribe bus with append-only
//! history. Long-running subscriber tasks pump the two peers, detect turn
//! boundaries, and schedule enrichment; the orchestrator assembles them and
//! owns teardown.

pub mod buffer;
pub mod bus;
pub mod enrichment;
pub mod orchestrator;
pub mod reader;
pub mod socket;
pub mod step;
pub mod turn;
pub mod upstream;
pub mod writer;

pub use bus::{ChatBus, Subscriber};
pub use orchestrator::{run_session, SessionParams};
pub use socket::{SocketError, TypedSocket};
