//! Host policy for module URLs.
//!
//! When local access is disabled, module and sidecar URLs must use HTTP(S)
//! and must not point at loopback, link-local or private addresses.

use thiserror::Error;
use url::{Host, Url};

/// A URL rejected by the host policy.
#[derive(Debug, Clone, Error)]
pub enum SecurityError {
    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),
    #[error("Access to loopback address denied: {0}")]
    LoopbackDenied(String),
    #[error("Access to private address denied: {0}")]
    PrivateAddressDenied(String),
}

/// Checks `url` against the host policy.
///
/// With `allow_local` set every URL passes, including non-HTTP schemes.
pub fn validate_url(url: &Url, allow_local: bool) -> Result<(), SecurityError> {
    if allow_local {
        return Ok(());
    }

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(SecurityError::InvalidScheme(url.scheme().to_string()));
    }

    match url.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.');
            if domain.eq_ignore_ascii_case("localhost")
                || domain.to_ascii_lowercase().ends_with(".localhost")
            {
                return Err(SecurityError::LoopbackDenied(domain.to_string()));
            }
        }
        Some(Host::Ipv4(ipv4)) => {
            if ipv4.is_loopback() || ipv4.is_unspecified() {
                return Err(SecurityError::LoopbackDenied(ipv4.to_string()));
            }
            if ipv4.is_private() || ipv4.is_link_local() {
                return Err(SecurityError::PrivateAddressDenied(ipv4.to_string()));
            }
        }
        Some(Host::Ipv6(ipv6)) => {
            if ipv6.is_loopback() || ipv6.is_unspecified() {
                return Err(SecurityError::LoopbackDenied(ipv6.to_string()));
            }
            // fc00::/7
            if (ipv6.segments()[0] & 0xfe00) == 0xfc00 || ipv6.is_unicast_link_local() {
                return Err(SecurityError::PrivateAddressDenied(ipv6.to_string()));
            }
            if let Some(mapped) = ipv6.to_ipv4_mapped() {
                if mapped.is_loopback() || mapped.is_private() || mapped.is_link_local() {
                    return Err(SecurityError::PrivateAddressDenied(ipv6.to_string()));
                }
            }
        }
        None => {}
    }

    Ok(())
}
