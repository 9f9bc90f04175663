pub mod ledger;
pub mod ports;
pub mod wallet;
