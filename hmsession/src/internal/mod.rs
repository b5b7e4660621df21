pub(crate) mod claims;
pub mod unixtime;
