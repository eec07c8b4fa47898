pub mod fee;
pub mod student;

pub use fee::{derive_balance, derive_status, Fee, FeeBreakdown, FeeStatus, Payment};
pub use student::{Student, UNKNOWN_STUDENT};
