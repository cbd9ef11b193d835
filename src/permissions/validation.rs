use crate::permissions::errors::PermissionError;
use crate::permissions::PERMISSION_GRANT;

/// Argument grammar: empty, `*`, or one or more word characters and
/// `=+/.:-` with an optional single trailing `*`.
pub fn is_valid_argument(argument: &str) -> bool {
    if argument.is_empty() || argument == "*" {
        return true;
    }
    let body = argument.strip_suffix('*').unwrap_or(argument);
    !body.is_empty() && body.chars().all(is_argument_char)
}

fn is_argument_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '=' | '+' | '/' | '.' | ':' | '-')
}

pub fn validate_argument(argument: &str) -> Result<(), PermissionError> {
    if is_valid_argument(argument) {
        Ok(())
    } else {
        Err(PermissionError::MalformedArgument(argument.to_string()))
    }
}

/// Delegation arguments of the grant marker: a permission-name glob,
/// optionally followed by `/` and an argument pattern, e.g. `network-*/prod`.
pub fn is_valid_delegation(argument: &str) -> bool {
    let (name_glob, pattern) = match argument.split_once('/') {
        Some((name_glob, pattern)) => (name_glob, pattern),
        None => (argument, ""),
    };
    !name_glob.is_empty() && name_glob.chars().all(is_name_glob_char) && is_valid_argument(pattern)
}

fn is_name_glob_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | '.' | '*')
}

/// Checks a grant argument against the grammar that applies to `permission`.
pub fn validate_grant_argument(permission: &str, argument: &str) -> Result<(), PermissionError> {
    if permission != PERMISSION_GRANT {
        return validate_argument(argument);
    }
    if is_valid_delegation(argument) {
        Ok(())
    } else {
        Err(PermissionError::MalformedArgument(argument.to_string()))
    }
}

/// Permission names: lowercase alphanumeric segments separated by one of
/// `_`, `-` or `.`, e.g. `network-east.admin`.
pub fn is_valid_permission_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let mut prev_sep = true;
    for c in name.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            prev_sep = false;
        } else if matches!(c, '_' | '-' | '.') {
            if prev_sep {
                return false;
            }
            prev_sep = true;
        } else {
            return false;
        }
    }
    !prev_sep
}

pub fn validate_permission_name(name: &str) -> Result<(), PermissionError> {
    if is_valid_permission_name(name) {
        Ok(())
    } else {
        Err(PermissionError::InvalidPermissionName(name.to_string()))
    }
}
