pub mod compactor;
pub mod engine;
pub mod http;
pub mod ledger;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
