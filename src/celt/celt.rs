//! Top-level CELT glue: error strings and the version identifier.

/// Returns the canonical error string associated with an Opus error code.
///
/// Mirrors `opus_strerror()` from `celt/celt.c`. Unrecognised codes fall back
/// to the "unknown error" string just like the C helper.
#[must_use]
pub fn opus_strerror(error: i32) -> &'static str {
    match error {
        0 => "success",
        -1 => "invalid argument",
        -2 => "buffer too small",
        -3 => "internal error",
        -4 => "corrupted stream",
        -5 => "request not implemented",
        -6 => "invalid state",
        -7 => "memory allocation failed",
        _ => "unknown error",
    }
}

/// Compile-time version string. The `-fixed` suffix identifies the build
/// flavour the same way the reference implementation tags its fixed-point
/// configuration.
pub(crate) const VERSION_STRING: &str =
    concat!("rythmos ", env!("CARGO_PKG_VERSION"), "-fixed");

/// Returns the textual version identifier for the library.
#[must_use]
pub(crate) fn opus_get_version_string() -> &'static str {
    VERSION_STRING
}

#[cfg(test)]
mod tests {
    use super::{opus_get_version_string, opus_strerror, VERSION_STRING};

    #[test]
    fn strerror_covers_every_canonical_code() {
        let expected = [
            "success",
            "invalid argument",
            "buffer too small",
            "internal error",
            "corrupted stream",
            "request not implemented",
            "invalid state",
            "memory allocation failed",
        ];
        for (offset, text) in expected.iter().enumerate() {
            assert_eq!(opus_strerror(-(offset as i32)), *text);
        }
    }

    #[test]
    fn strerror_falls_back_for_unknown_codes() {
        assert_eq!(opus_strerror(1), "unknown error");
        assert_eq!(opus_strerror(-8), "unknown error");
        assert_eq!(opus_strerror(i32::MIN), "unknown error");
    }

    #[test]
    fn version_string_carries_the_build_flavour() {
        assert_eq!(opus_get_version_string(), VERSION_STRING);
        assert!(opus_get_version_string().ends_with("-fixed"));
    }
}
