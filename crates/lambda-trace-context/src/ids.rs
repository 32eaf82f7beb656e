//! Conversion from X-Ray identifiers to decimal-string ids.
//!
//! Datadog ids travel as decimal strings so that they survive runtimes
//! without native 64-bit integers. X-Ray uses a 96-bit hex trace id with a
//! version and epoch prefix (`1-{8 hex}-{24 hex}`) and a 64-bit hex parent id.
//!
//! Every function here is total: malformed input yields `None`.

use crate::context::SampleMode;

const XRAY_TRACE_ID_RANDOM_LEN: usize = 24;
const XRAY_PARENT_ID_LEN: usize = 16;
const LOW_63_BITS: u64 = u64::MAX >> 1;

/// Converts an X-Ray trace id into a decimal trace id.
///
/// Only the 24-hex-digit random part is used. It is read as a 96-bit
/// integer and reduced to its low 63 bits.
///
/// # Example
///
/// ```
/// use lambda_trace_context::ids::xray_trace_id_to_local;
///
/// assert_eq!(
///     xray_trace_id_to_local("1-5ce31dc2-2c779014b90ce44db5e03875").as_deref(),
///     Some("4110911582297405557"),
/// );
/// assert!(xray_trace_id_to_local("1-5ce31dc2").is_none());
/// ```
pub fn xray_trace_id_to_local(xray_trace_id: &str) -> Option<String> {
    let parts: Vec<&str> = xray_trace_id.split('-').collect();
    if parts.len() != 3 {
        return None;
    }

    let random = parts[2];
    if random.len() != XRAY_TRACE_ID_RANDOM_LEN || !is_hex(random) {
        return None;
    }

    let value = u128::from_str_radix(random, 16).ok()?;
    Some(((value as u64) & LOW_63_BITS).to_string())
}

/// Converts a 16-hex-digit X-Ray parent id into a decimal span id.
///
/// ```
/// use lambda_trace_context::ids::xray_parent_id_to_local;
///
/// assert_eq!(
///     xray_parent_id_to_local("0b11cc4230d3e09e").as_deref(),
///     Some("797643193680388254"),
/// );
/// ```
pub fn xray_parent_id_to_local(xray_parent_id: &str) -> Option<String> {
    if xray_parent_id.len() != XRAY_PARENT_ID_LEN || !is_hex(xray_parent_id) {
        return None;
    }

    u64::from_str_radix(xray_parent_id, 16)
        .ok()
        .map(|id| id.to_string())
}

/// Maps the X-Ray `Sampled` flag to a sample mode.
///
/// X-Ray sampling decisions are treated as user decisions, so they map to
/// the `USER_*` modes.
pub fn sample_mode_from_xray(sampled: u8) -> SampleMode {
    if sampled == 1 {
        SampleMode::UserKeep
    } else {
        SampleMode::UserReject
    }
}

// `from_str_radix` accepts a leading sign, so validate characters first.
fn is_hex(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_hexdigit())
}
