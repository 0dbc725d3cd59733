pub mod bls;
pub mod certificate;
pub mod light_client;

pub use certificate::*;
pub use light_client::*;
