pub(crate) mod models;
pub(crate) mod question;
pub(crate) mod types;
