pub mod config;
pub mod enums;
pub mod error;
pub mod money;
pub mod db;
pub mod notifier;
pub mod services;
pub mod scheduler;
pub mod api;
pub mod test_utils;

pub use config::Config;
pub use enums::{ Currency, DebitPolicy, Direction, StoredTxType, TransactionKind, TxStatus };
pub use error::{ AppError, Result };
