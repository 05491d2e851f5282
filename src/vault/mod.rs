//! The vault: typed, encrypted values over a plain-string store.
//!
//! - `value`: `TypedValue` and `ValueKind`
//! - `codec`: canonical text form and kind inference
//! - `batch`: `PendingBatch` and the fluent `VaultEditor`
//! - `store`: the `Vault` facade itself

pub mod batch;
pub mod codec;
pub mod store;
pub mod value;

pub use batch::{PendingBatch, VaultEditor};
pub use codec::{decode, encode, infer_and_decode, STRING_SET_SEPARATOR};
pub use store::Vault;
pub use value::{TypedValue, ValueKind};
