mod account;
mod analysis;
mod flow;
mod ledger;
mod money;
mod operations;
mod qr;
mod rate;
mod referral;
mod transaction;

pub use account::*;
pub use analysis::*;
pub use flow::*;
pub use ledger::*;
pub use money::*;
pub use operations::*;
pub use qr::*;
pub use rate::*;
pub use referral::*;
pub use transaction::*;
