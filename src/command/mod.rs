mod chat;
mod fetch;
mod records;

pub use chat::run_chat;
pub use fetch::run_fetch;
pub use records::run_records;
