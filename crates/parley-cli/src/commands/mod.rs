pub mod claim;
pub mod keys;
pub mod negotiate;
pub mod records;
