mod account;
mod subscription;
mod voucher;

pub use account::*;
pub use subscription::*;
pub use voucher::*;
