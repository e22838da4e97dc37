pub mod csv;
pub mod digest;
pub mod jwt;
pub mod qr_image;
pub mod time;

pub use jwt::*;
pub use time::*;
