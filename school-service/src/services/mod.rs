pub mod database;
pub mod jwt;
pub mod ledger;
pub mod memory;
pub mod store;

pub use database::{MongoDb, MongoFeeStore, MongoStudentStore};
pub use jwt::{AccessTokenClaims, JwtService, Role};
pub use ledger::{FeeLedger, FeeSummary};
pub use memory::{InMemoryFeeStore, InMemoryStudentStore};
pub use store::{FeeQuery, FeeStore, SearchTerm, StudentStore};
