mod identical_value_check;
pub use identical_value_check::identical_value_check;

mod iqr_check;
pub use iqr_check::{iqr_check, quartiles};

mod rate_of_change_check;
pub use rate_of_change_check::rate_of_change_check;
