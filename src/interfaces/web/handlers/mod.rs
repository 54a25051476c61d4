pub mod admin;
pub mod callbacks;
pub mod generate;
pub mod library;
pub mod status;

#[cfg(test)]
pub(crate) mod test_support;
