pub mod quote;
pub mod requests;
pub mod scoring;

pub use quote::*;
pub use requests::*;
pub use scoring::*;
