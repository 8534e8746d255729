//! Peer Networking
//!
//! Plumbing shared by every role for talking to other processes: resolving
//! server names to URLs, the reqwest transport with error mapping, and the
//! bounded-backoff retry loop used wherever the protocol says "retry until
//! success".

pub mod address;
pub mod http;
pub mod retry;

pub use address::{AddressBook, DEFAULT_PEER_TEMPLATE};
pub use http::{HEADER_COMMIT_INDEX, HEADER_REQUEST_COUNT, HttpTransport, sequence_header};
pub use retry::{RetryPolicy, cancelled};
