pub mod lists;
pub mod tld;
pub mod writer;
