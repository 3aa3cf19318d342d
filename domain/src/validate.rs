//! Lightweight input validation helpers. Keep logic minimal and deterministic.

use crate::{ClientFields, CoreError};

/// Every field must be non-empty after trimming. Values are not rewritten.
pub fn validate_fields(fields: &ClientFields) -> Result<(), CoreError> {
    let checks = [
        ("name", &fields.name),
        ("email", &fields.email),
        ("phone", &fields.phone),
        ("address", &fields.address),
    ];
    for (name, value) in checks {
        if value.trim().is_empty() {
            return Err(CoreError::MissingField(name));
        }
    }
    Ok(())
}
