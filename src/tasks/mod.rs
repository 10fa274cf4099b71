pub(crate) mod expiration;
pub(crate) mod scheduler;
