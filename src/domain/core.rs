mod booking;
mod consumer;
mod provider;
mod ranking;
mod reservation;
mod window;

pub use self::booking::*;
pub use self::consumer::*;
pub use self::provider::*;
pub use self::ranking::*;
pub use self::reservation::*;
pub use self::window::*;
