pub mod user;
pub mod transaction;

pub use user::Entity as User;
pub use transaction::Entity as Transaction;
