mod activation_code;
mod entitlement;

pub use activation_code::*;
pub use entitlement::*;
