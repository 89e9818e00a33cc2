pub mod address_validator;
pub mod hex_utils;

pub use address_validator::AddressValidator;
