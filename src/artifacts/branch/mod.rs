//! Branch names and symbolic reference names

pub mod branch_name;

/// Anything matching this pattern is not a valid git ref name component
pub const INVALID_BRANCH_NAME_REGEX: &str =
    r"^\.|\/\.|\.\.|^\/|\/$|\.lock$|@\{|[\x00-\x20\*:\?\[\\~\^\x7f]";
