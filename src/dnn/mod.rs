mod layer;
mod network;

pub use layer::Layer;
pub use network::Network;
