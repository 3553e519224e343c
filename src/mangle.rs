//! Block name mangling
//!
//! Names must fit a fixed-width report column. Long names are shortened by
//! deleting vowels from the right, then underscores from the right, which
//! keeps the consonant skeleton readable.

use crate::error::{ProfileError, Result};
use crate::{MANGLE_MAX, NAME_MAX};

const VOWELS: &[u8] = b"aeiou";

/// Shorten `name` to fewer than `NAME_MAX` bytes.
///
/// # Example
/// ```
/// use blockprof::mangle::mangle;
///
/// assert_eq!(mangle("main").unwrap(), "main");
/// let short = mangle("a_very_long_region_name_that_exceeds_limit_abcdef").unwrap();
/// assert_eq!(short, "_vry_lng_rgn_nm_tht_xcdslmtbcdf");
/// ```
pub fn mangle(name: &str) -> Result<String> {
    if name.len() < NAME_MAX {
        return Ok(name.to_string());
    }

    if name.len() >= MANGLE_MAX {
        return Err(ProfileError::NameTooLong { len: name.len() });
    }

    let mut bytes = name.as_bytes().to_vec();

    while bytes.len() >= NAME_MAX {
        let victim = bytes
            .iter()
            .rposition(|b| VOWELS.contains(b))
            .or_else(|| bytes.iter().rposition(|&b| b == b'_'))
            .ok_or_else(|| ProfileError::NameUnmangleable {
                name: name.to_string(),
            })?;
        bytes.remove(victim);
    }

    // Only ASCII bytes were removed, so the remaining bytes are valid UTF-8
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
