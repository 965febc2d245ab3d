#![allow(async_fn_in_trait)]

pub mod bus;
pub mod capture;
pub mod traits;

pub use bus::{VirtualBus, VirtualLink};
pub use traits::{CecLink, LinkError, SendResult};
