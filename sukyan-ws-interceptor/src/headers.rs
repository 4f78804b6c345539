//! Handshake header manipulation: stripping the permessage-deflate
//! extension offer so the interceptor is the only party that ever sees
//! compressed frames, and stripping the WebSocket upgrade headers entirely
//! when a captured handshake is replayed by the scanner.

const SEC_WEBSOCKET_EXTENSIONS: &str = "sec-websocket-extensions";
const HANDSHAKE_HEADER_PREFIXES: &[&str] = &["sec-websocket-"];
const HANDSHAKE_HEADER_NAMES: &[&str] = &["connection", "upgrade"];

/// Removes the `permessage-deflate` token from `Sec-WebSocket-Extensions`,
/// dropping the header entirely if it was the only offered extension. Other
/// headers pass through unchanged.
pub fn strip_permessage_deflate(headers: &[(String, String)]) -> Vec<(String, String)> {
    let mut out = Vec::with_capacity(headers.len());
    for (name, value) in headers {
        if name.eq_ignore_ascii_case(SEC_WEBSOCKET_EXTENSIONS) {
            let remaining: Vec<&str> = value
                .split(',')
                .map(str::trim)
                .filter(|token| !token.eq_ignore_ascii_case("permessage-deflate"))
                .filter(|token| !token.is_empty())
                .collect();
            if remaining.is_empty() {
                continue;
            }
            out.push((name.clone(), remaining.join(", ")));
        } else {
            out.push((name.clone(), value.clone()));
        }
    }
    out
}

/// Strips `Connection`, `Upgrade`, and all `Sec-WebSocket-*` headers so a
/// captured WebSocket handshake can be replayed as a plain HTTP request by
/// the template scanner.
pub fn strip_handshake_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| {
            let lower = name.to_ascii_lowercase();
            !HANDSHAKE_HEADER_NAMES.contains(&lower.as_str())
                && !HANDSHAKE_HEADER_PREFIXES
                    .iter()
                    .any(|prefix| lower.starts_with(prefix))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(name: &str, value: &str) -> (String, String) {
        (name.to_string(), value.to_string())
    }

    #[test]
    fn strips_permessage_deflate_token_only() {
        let headers = vec![
            h("Sec-WebSocket-Extensions", "permessage-deflate; client_max_window_bits, x-custom"),
            h("Host", "example.com"),
        ];
        let out = strip_permessage_deflate(&headers);
        assert_eq!(out[0].1, "x-custom");
        assert_eq!(out[1], h("Host", "example.com"));
    }

    #[test]
    fn drops_extensions_header_when_it_was_the_only_token() {
        let headers = vec![h("Sec-WebSocket-Extensions", "permessage-deflate")];
        let out = strip_permessage_deflate(&headers);
        assert!(out.is_empty());
    }

    #[test]
    fn strip_handshake_headers_removes_upgrade_machinery() {
        let headers = vec![
            h("Connection", "Upgrade"),
            h("Upgrade", "websocket"),
            h("Sec-WebSocket-Key", "abc"),
            h("Sec-WebSocket-Version", "13"),
            h("Host", "example.com"),
        ];
        let out = strip_handshake_headers(&headers);
        assert_eq!(out, vec![h("Host", "example.com")]);
    }
}
