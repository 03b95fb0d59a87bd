pub mod expression;
pub mod template;

pub use expression::{CronExpression, CronField, FieldSpec, FIELDS};
pub use template::{CronTemplate, CronTemplateInput, TABLE_LOCK_RECORD_ID};
