use regex::Regex;

/// Extract Spotify track ID from a URL or URI
///
/// Supports multiple formats:
/// - https://open.spotify.com/track/TRACK_ID
/// - https://open.spotify.com/track/TRACK_ID?si=...
/// - spotify:track:TRACK_ID
///
/// # Examples
/// ```
/// use areaflow::spotify::parser::extract_track_id;
///
/// let url = "https://open.spotify.com/track/3n3Ppam7vgaVa1iaRUc9Lp?si=abc";
/// assert_eq!(extract_track_id(url), Some("3n3Ppam7vgaVa1iaRUc9Lp".to_string()));
/// ```
pub fn extract_track_id(text: &str) -> Option<String> {
    let url_pattern = Regex::new(r"https?://open\.spotify\.com/track/([a-zA-Z0-9]+)").ok()?;
    if let Some(captures) = url_pattern.captures(text) {
        return Some(captures[1].to_string());
    }

    let uri_pattern = Regex::new(r"spotify:track:([a-zA-Z0-9]+)").ok()?;
    if let Some(captures) = uri_pattern.captures(text) {
        return Some(captures[1].to_string());
    }

    None
}

/// Normalize an automate option into a `spotify:track:` URI
///
/// Blank options yield `None`; anything else must contain a track link.
pub fn track_uri(option: &str) -> Option<String> {
    extract_track_id(option.trim()).map(|id| format!("spotify:track:{}", id))
}
