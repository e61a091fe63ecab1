//! Extraction of the `--platform=<value>` runtime argument.
//!
//! The platform flag is pulled out of the argument list before anything else
//! looks at it, so the remaining arguments can be handed to other parsers
//! without them tripping over it.

use thiserror::Error;

/// Prefix of the mandatory platform argument.
pub const PLATFORM_KEY: &str = "--platform";

/// Errors raised while reading the invocation arguments.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ArgsError {
    /// No argument starting with [`PLATFORM_KEY`] was given.
    #[error("Missing required flag: expected a --platform=<android|ios> runtime argument")]
    MissingPlatform,
}

/// Removes the first argument starting with [`PLATFORM_KEY`] and returns its value.
///
/// The value is everything after the prefix and its one-character separator,
/// so `--platform=ios` yields `"ios"`. The value is not validated here; see
/// [`crate::platform::Platform`] for that.
///
/// # Returns
///
/// The raw platform value together with the remaining arguments, in their
/// original order.
///
/// # Errors
///
/// - [`ArgsError::MissingPlatform`] if no argument carries the prefix
pub fn take_platform<I, S>(args: I) -> Result<(String, Vec<String>), ArgsError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut rest: Vec<String> = args.into_iter().map(Into::into).collect();
    let index = rest
        .iter()
        .position(|arg| arg.starts_with(PLATFORM_KEY))
        .ok_or(ArgsError::MissingPlatform)?;

    let arg = rest.remove(index);
    let value = arg
        .get(PLATFORM_KEY.len() + 1..)
        .unwrap_or_default()
        .to_string();

    Ok((value, rest))
}
