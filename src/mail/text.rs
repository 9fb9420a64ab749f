//! Plain-text helpers for reply prefixes and quoted history.

/// Strip quoted history from a plain-text body, leaving the latest reply.
///
/// Removes:
/// - Lines starting with `>` (quoted reply lines)
/// - Everything after an "On ... wrote:" attribution line
/// - Everything after an "Original Message" separator or an Outlook
///   `From:` header block
pub fn strip_quoted_text(body: &str) -> String {
    let mut result = Vec::new();

    for line in body.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('>') {
            continue;
        }

        if trimmed.starts_with("On ") && trimmed.ends_with("wrote:") {
            break;
        }

        if trimmed.starts_with("---") && trimmed.contains("Original Message") {
            break;
        }

        // Outlook separator: a bare "From:" header directly after a blank line
        if trimmed.starts_with("From:")
            && result
                .last()
                .is_some_and(|l: &&str| l.trim().is_empty())
        {
            break;
        }

        result.push(line);
    }

    while result.last().is_some_and(|l| l.trim().is_empty()) {
        result.pop();
    }

    result.join("\n")
}

/// Remove any run of `RE:`/`FW:`/`FWD:` prefixes from a subject.
pub fn strip_reply_prefixes(subject: &str) -> &str {
    let mut rest = subject.trim_start();
    loop {
        let Some((head, tail)) = rest.split_once(':') else {
            return rest;
        };
        if matches!(head.trim().to_ascii_lowercase().as_str(), "re" | "fw" | "fwd") {
            rest = tail.trim_start();
        } else {
            return rest;
        }
    }
}

/// Case-insensitive comparison over the full Unicode case mapping.
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}
