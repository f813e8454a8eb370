mod credential_store;

pub use credential_store::{delete_token, store_token, CredentialStore};
