mod reading;

pub use reading::CanonicalRecord;
