pub mod balance_manager;
pub mod transaction_service;
pub mod referral_service;
pub mod farming_service;
pub mod wallet_service;
pub mod user_service;
pub mod reconciliation_service;

pub use balance_manager::{ BalanceManager, Balances };
pub use transaction_service::{ CreateTransactionRequest, TransactionOutcome, TransactionService };
pub use referral_service::{ ChainStop, PropagationReport, ReferralService };
pub use farming_service::{ AccrualOutcome, AccrualStream, FarmingService };
pub use wallet_service::WalletService;
pub use user_service::UserService;
pub use reconciliation_service::ReconciliationService;
