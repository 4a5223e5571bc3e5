//! # Utility Functions Module
//!
//! Helpers for building subprocess argument lists without repeating
//! `.to_string()` on every element.

/// Converts any iterable of displayable items into owned strings.
///
/// # Example
/// ```rust
/// use auto_media_optimizer::utils::to_string_vec;
///
/// let crf = 23;
/// let args = to_string_vec(["-crf", &crf.to_string(), "-preset", "medium"]);
/// assert_eq!(args, vec!["-crf", "23", "-preset", "medium"]);
/// ```
pub fn to_string_vec<T, I>(items: I) -> Vec<String>
where
    T: ToString,
    I: IntoIterator<Item = T>,
{
    items.into_iter().map(|item| item.to_string()).collect()
}

/// Builds a `Vec<String>` from heterogeneous displayable values.
///
/// ```rust
/// use auto_media_optimizer::args;
///
/// let fps = 30;
/// assert_eq!(args!["-r", fps], vec!["-r".to_string(), "30".to_string()]);
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        vec![$(($item).to_string()),*]
    };
}
