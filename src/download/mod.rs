pub mod client;
pub mod extract;
pub mod layout;

pub use client::*;
pub use extract::*;
pub use layout::*;
