pub mod nop;
pub mod sqlite;

pub use nop::NopStore;
pub use sqlite::SqliteSeenStore;
