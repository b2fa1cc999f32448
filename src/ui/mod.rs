pub mod icons;
pub mod progress;
pub mod summary;

pub use progress::MigrationUI;
pub use summary::{print_record, print_summary};
