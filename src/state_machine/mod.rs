mod item;
mod status;

pub use item::{CustomRule, ItemInput, ItemOutcome, ItemReport, Severity, SourceType};
pub use status::{ItemStatus, StatusMachine};
