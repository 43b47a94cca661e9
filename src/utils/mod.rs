pub mod dns;
pub mod lru;
pub mod smtp;
