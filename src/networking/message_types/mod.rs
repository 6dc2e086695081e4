pub mod pseudonym_message;
pub mod store_message;
