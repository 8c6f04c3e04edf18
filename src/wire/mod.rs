//! Self-describing recursive wire format
//!
//! Every message on a connection, and every persisted transaction, is one
//! length-prefixed item: either a raw byte-string or an ordered list of
//! further items. [`WireValue`] is the decoded form; [`codec`] holds the
//! stateless encoder/decoder.

pub mod codec;
pub mod value;

pub use codec::{decode, encode, WireError, MAX_ITEM_LEN};
pub use value::WireValue;
