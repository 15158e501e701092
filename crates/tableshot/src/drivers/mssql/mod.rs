//! Microsoft SQL Server driver.

mod catalog;
mod convert;
mod pool;

pub use catalog::MssqlCatalog;
pub use convert::convert_row_value;
pub use pool::{connect_pool, MssqlClient, TiberiusConnectionManager};
