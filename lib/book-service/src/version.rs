use crate::ServiceError;

/// The only contract version this service implements.
pub const API_VERSION: &str = "v1";

/// Reject a request that declares a version other than [`API_VERSION`].
///
/// An empty version means the caller opted out of the check.
pub fn check_api(requested: &str) -> Result<(), ServiceError> {
    if !requested.is_empty() && requested != API_VERSION {
        return Err(ServiceError::unimplemented(format!(
            "unsupported API version: implemented API version '{}' requested version '{}'",
            API_VERSION, requested
        )));
    }
    Ok(())
}
