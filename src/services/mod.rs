pub(crate) mod answers;
pub(crate) mod tokens;
