//! Movement of data between the serving store and the file warehouse.
//!
//! The [`ServingStore`] trait is the online side of the system: the
//! low-latency store the application reads and writes while serving
//! traffic. [`MemoryStore`] is the bundled implementation. The
//! [`Transporter`] shuttles ratings, the user roster, and finished
//! recommendation lists between the two worlds.

mod memory;
mod store;
mod transporter;

pub use memory::MemoryStore;
pub use store::{ServingStore, StoreError, StoredRating};
pub use transporter::{Result, TransportError, Transporter};
