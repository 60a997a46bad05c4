//! HTML-aware truncation.
//!
//! Counts visible characters only: tags and comments are free, an entity
//! counts as one character. Elements left open at the cut are closed.
//!
//! A `<` only opens markup when it looks like a tag (`<p`, `</p`, `<!`, `<?`)
//! and is closed by a `>` with no other `<` in between. Anything else is
//! ordinary text and counts toward the budget.

const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Elements whose content is never visible text
const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

/// Longest entity we treat as a single character (`&thetasym;`)
const MAX_ENTITY_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    /// `<!-- ... -->`
    Comment(usize),
    /// `<script>...</script>` or `<style>...</style>`
    RawText(usize),
    Tag(usize),
    /// One visible character or entity
    Text(usize),
}

/// Cut `html` after `max_chars` visible characters.
/// Content that already fits is returned unchanged.
pub fn truncate_html(html: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(html.len());
    let mut open: Vec<String> = Vec::new();
    let mut count = 0usize;
    let mut rest = html;

    while !rest.is_empty() {
        let len = match next_token(rest) {
            Token::Comment(len) | Token::RawText(len) => len,
            Token::Tag(len) => {
                track_tag(&rest[..len], &mut open);
                len
            }
            Token::Text(_) if count >= max_chars => break,
            Token::Text(len) => {
                count += 1;
                len
            }
        };
        out.push_str(&rest[..len]);
        rest = &rest[len..];
    }

    // Everything fit; leave the author's markup alone
    if rest.is_empty() {
        return html.to_string();
    }

    for name in open.iter().rev() {
        out.push_str("</");
        out.push_str(name);
        out.push('>');
    }
    out
}

/// Number of visible characters in `html`
pub fn visible_len(html: &str) -> usize {
    let mut count = 0usize;
    let mut rest = html;

    while !rest.is_empty() {
        let len = match next_token(rest) {
            Token::Comment(len) | Token::RawText(len) | Token::Tag(len) => len,
            Token::Text(len) => {
                count += 1;
                len
            }
        };
        rest = &rest[len..];
    }
    count
}

fn next_token(s: &str) -> Token {
    if s.starts_with("<!--") {
        if let Some(end) = s.find("-->") {
            return Token::Comment(end + 3);
        }
    } else if let Some(len) = tag_len(s) {
        return raw_text_len(s, len).map_or(Token::Tag(len), Token::RawText);
    }

    let step = entity_len(s)
        .or_else(|| s.chars().next().map(char::len_utf8))
        .unwrap_or(s.len());
    Token::Text(step)
}

/// Length of the tag at the start of `s`, if it is one
fn tag_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    if bytes.first() != Some(&b'<') {
        return None;
    }

    let name_start = match *bytes.get(1)? {
        b'!' | b'?' => None,
        b'/' => Some(2),
        c if c.is_ascii_alphabetic() => Some(1),
        _ => return None,
    };

    if let Some(start) = name_start {
        if !bytes.get(start)?.is_ascii_alphabetic() {
            return None;
        }
        let name_end = bytes[start..]
            .iter()
            .position(|c| !(c.is_ascii_alphanumeric() || *c == b'-' || *c == b':'))
            .map_or(bytes.len(), |i| start + i);
        match bytes.get(name_end) {
            Some(b'>') | Some(b'/') => {}
            Some(c) if c.is_ascii_whitespace() => {}
            _ => return None,
        }
    }

    let end = s.find('>')?;
    if s[1..end].contains('<') {
        return None;
    }
    Some(end + 1)
}

/// Length of a whole script or style element starting with the tag of
/// length `open_len`. `None` if it is another tag or is never closed.
fn raw_text_len(s: &str, open_len: usize) -> Option<usize> {
    let name = tag_name(s.get(1..)?);
    if !RAW_TEXT_ELEMENTS.contains(&name.as_str()) || s[..open_len].ends_with("/>") {
        return None;
    }
    let close = format!("</{}", name);
    let body = &s[open_len..];
    let at = find_ignore_ascii_case(body, &close)?;
    let end = body[at..].find('>')?;
    Some(open_len + at + end + 1)
}

fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

fn entity_len(s: &str) -> Option<usize> {
    if !s.starts_with('&') {
        return None;
    }
    let end = s.find(';')?;
    if end < 2 || end > MAX_ENTITY_LEN {
        return None;
    }
    let body = &s[1..end];
    let valid = body.strip_prefix('#').map_or_else(
        || body.chars().all(|c| c.is_ascii_alphanumeric()),
        |num| !num.is_empty() && num.chars().all(|c| c.is_ascii_hexdigit() || c == 'x' || c == 'X'),
    );
    valid.then_some(end + 1)
}

fn track_tag(tag: &str, open: &mut Vec<String>) {
    if tag.starts_with("<!") || tag.starts_with("<?") {
        return;
    }

    if let Some(closing) = tag.strip_prefix("</") {
        let name = tag_name(closing);
        if let Some(pos) = open.iter().rposition(|n| *n == name) {
            open.truncate(pos);
        }
        return;
    }

    let name = tag_name(&tag[1..]);
    if name.is_empty() || tag.ends_with("/>") || VOID_ELEMENTS.contains(&name.as_str()) {
        return;
    }
    open.push(name);
}

fn tag_name(s: &str) -> String {
    s.chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == ':')
        .collect::<String>()
        .to_ascii_lowercase()
}
