//! Hub address handling.

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub const DEFAULT_DOMAIN: &str = "vercel.run";

static SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(wss?|https?)://").expect("scheme pattern is valid"));

/// Turn user input into a WebSocket URL.
///
/// Full `ws(s)://` URLs pass through, `http(s)://` is rewritten to the
/// matching WebSocket scheme and anything else is treated as a subdomain
/// of `domain`.
pub fn normalize_target(input: &str, domain: &str, ws_path: &str) -> String {
    let trimmed = input.trim();

    if let Some(caps) = SCHEME.captures(trimmed) {
        let scheme = caps[1].to_ascii_lowercase();
        let rest = &trimmed[caps[0].len()..];
        let scheme = match scheme.as_str() {
            "https" => "wss",
            "http" => "ws",
            other => return format!("{}://{}", other, rest),
        };
        return format!("{}://{}", scheme, rest);
    }

    format!("wss://{}.{}{}", trimmed, domain, ws_path)
}

/// Ask for a target on stdin.
pub async fn prompt_target() -> std::io::Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(b"Enter sandbox subdomain or full URL (e.g. sb-337r61t9jnic): ")
        .await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(line.trim().to_string())
}
