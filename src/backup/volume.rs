//! Windows style volume handling for job paths.
//!
//! Job files name sources and targets with drive letters or UNC shares
//! regardless of the platform the runner is built on, so splitting is done on
//! the string form rather than through `std::path::Path`.

fn is_separator(c: char) -> bool {
    c == '\\' || c == '/'
}

/// Splits `path` into its volume and the remainder.
///
/// `C:\data` gives `("C:", "\data")` and `\\server\share\x` gives
/// `("\\server\share", "\x")`. Drive letters come back upper case. Returns
/// `None` when the path carries no volume or is drive relative (`C:data`).
pub fn split_volume(path: &str) -> Option<(String, String)> {
    let mut chars = path.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some(a), Some(b), third) if is_separator(a) && is_separator(b) => {
            // \\server\share, a third leading separator is malformed
            if third.is_some_and(is_separator) {
                return None;
            }
            let rest = &path[2..];
            let server_end = rest.find(is_separator)?;
            let share = &rest[server_end + 1..];
            if share.is_empty() || share.starts_with(is_separator) {
                return None;
            }
            let share_end = share.find(is_separator).unwrap_or(share.len());
            let volume_len = 2 + server_end + 1 + share_end;
            Some((path[..volume_len].to_owned(), path[volume_len..].to_owned()))
        }
        // C:data is relative to the drive's current directory
        (Some(letter), Some(':'), third)
            if letter.is_ascii_alphabetic() && third.is_none_or(is_separator) =>
        {
            Some((
                format!("{}:", letter.to_ascii_uppercase()),
                path[2..].to_owned(),
            ))
        }
        _ => None,
    }
}

pub fn is_unc_volume(volume: &str) -> bool {
    volume.starts_with("\\\\") || volume.starts_with("//")
}

/// Drive letter of a volume, e.g. `C` for `C:`.
pub fn volume_letter(volume: &str) -> Option<char> {
    match split_volume(volume) {
        Some((v, _)) if !is_unc_volume(&v) => v.chars().next(),
        _ => None,
    }
}

/// Removes trailing separators while keeping a bare volume root intact.
pub fn strip_trailing_separators(path: &str) -> &str {
    let trimmed = path.trim_end_matches(is_separator);
    match split_volume(path) {
        Some((volume, _)) if trimmed.len() <= volume.len() => &path[..(volume.len() + 1).min(path.len())],
        _ if trimmed.is_empty() => path,
        _ => trimmed,
    }
}
