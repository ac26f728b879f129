mod error;

pub mod codec;
pub mod registry;
pub mod transport;

pub use error::{CodecError, NetworkError};
pub use registry::{ClusterRegistry, PeerAddress};
pub use transport::{Transport, TransportStats};
