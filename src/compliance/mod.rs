pub mod index;
pub mod resolver;

pub use index::{ComplianceClause, ComplianceIndex};
pub use resolver::{ComplianceResolver, NO_TAGS_ISSUE};
