//! Confirmation code generation.

/// Eight uppercase hex characters from four random bytes.
pub fn generate_confirmation_code() -> String {
    let bytes: [u8; 4] = rand::random();
    format!("{:08X}", u32::from_be_bytes(bytes))
}
