//! Server-sent event framing helpers

/// Blank lines separating two events, LF and CRLF framed
const EVENT_DELIMITERS: [&[u8]; 2] = [b"\n\n", b"\r\n\r\n"];

const DATA_FIELD: &str = "data:";
const DONE_MARKER: &str = "[DONE]";

/// Splits `buffer` into complete events and the unterminated remainder
///
/// The remainder is empty when `buffer` ends on a delimiter.
pub fn split_events(buffer: &[u8]) -> (Vec<&[u8]>, &[u8]) {
    let mut events = Vec::new();
    let mut rest = buffer;

    while let Some((pos, len)) = find_delimiter(rest) {
        events.push(&rest[..pos]);
        rest = &rest[pos + len..];
    }

    (events, rest)
}

/// Payload of the first `data:` line of an event
///
/// Returns `None` for events without a data line, with an empty payload, or
/// carrying the end-of-stream marker.
pub fn event_data(event: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(event).ok()?;

    let data = text
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .find_map(|line| line.strip_prefix(DATA_FIELD))?
        .trim();

    (!data.is_empty() && data != DONE_MARKER).then_some(data)
}

/// Position and length of the earliest delimiter in `buffer`
fn find_delimiter(buffer: &[u8]) -> Option<(usize, usize)> {
    EVENT_DELIMITERS
        .iter()
        .filter_map(|delimiter| {
            buffer
                .windows(delimiter.len())
                .position(|window| window == *delimiter)
                .map(|pos| (pos, delimiter.len()))
        })
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_complete_events() {
        let (events, rest) = split_events(b"data: a\n\ndata: b\n\n");

        assert_eq!(events, vec![&b"data: a"[..], &b"data: b"[..]]);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_split_keeps_remainder() {
        let (events, rest) = split_events(b"data: a\n\ndata: b");

        assert_eq!(events, vec![&b"data: a"[..]]);
        assert_eq!(rest, b"data: b");
    }

    #[test]
    fn test_no_delimiter_yields_no_events() {
        let (events, rest) = split_events(b"data: {\"choices\"");

        assert!(events.is_empty());
        assert_eq!(rest, b"data: {\"choices\"");
    }

    #[test]
    fn test_split_crlf_framed_events() {
        let (events, rest) = split_events(b"data: a\r\n\r\ndata: b\r\n\r\ndata: c\r\n");

        assert_eq!(events, vec![&b"data: a"[..], &b"data: b"[..]]);
        assert_eq!(rest, b"data: c\r\n");
        assert_eq!(event_data(events[1]), Some("b"));
    }

    #[test]
    fn test_split_mixed_framing_in_order() {
        let (events, rest) = split_events(b"data: a\r\n\r\ndata: b\n\n");

        assert_eq!(events, vec![&b"data: a"[..], &b"data: b"[..]]);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_event_data_first_data_line() {
        let event = b"event: message\nid: 7\ndata: {\"x\":1}\ndata: ignored";

        assert_eq!(event_data(event), Some("{\"x\":1}"));
    }

    #[test]
    fn test_event_data_without_space() {
        assert_eq!(event_data(b"data:{\"x\":1}"), Some("{\"x\":1}"));
    }

    #[test]
    fn test_event_data_skips_done_and_comments() {
        assert_eq!(event_data(b"data: [DONE]"), None);
        assert_eq!(event_data(b": keep-alive"), None);
        assert_eq!(event_data(b"data:"), None);
    }
}
