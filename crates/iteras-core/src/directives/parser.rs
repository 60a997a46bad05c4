//! Bracket directive parser.
//!
//! Recognizes `[name attr="v" attr2='v' attr3=v positional]`, the
//! self-closing `[name /]` and the enclosing `[name ...]body[/name]` form.
//! Only names in the caller's list are treated as directives; any other
//! bracketed text is left alone.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectiveError {
    #[error("Unterminated directive [{0}")]
    Unterminated(String),

    #[error("Unterminated quoted value in [{0}")]
    UnterminatedQuote(String),

    #[error("Bad attribute syntax in [{name} at offset {offset}")]
    BadAttribute { name: String, offset: usize },
}

/// Directive attributes in source order. Positional values are keyed by
/// their index ("0", "1", ...). Names are lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later duplicates override earlier ones
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_ascii_lowercase();
        let value = value.into();
        match self.0.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn push_positional(&mut self, value: String) {
        let index = self.0.iter().filter(|(k, _)| k.parse::<usize>().is_ok()).count();
        self.0.push((index.to_string(), value));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive<'a> {
    pub name: &'a str,
    pub attrs: Attributes,
    /// Enclosed text for the `[name]body[/name]` form
    pub body: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Directive(Directive<'a>),
}

/// Split `text` into literal text and recognized directives.
/// Malformed directives are kept as literal text.
pub fn parse<'a>(text: &'a str, known: &[&str]) -> Vec<Segment<'a>> {
    let mut segments = Vec::new();
    let mut rest = text;
    let mut literal_start = 0usize;

    while let Some(found) = rest[literal_start..].find('[') {
        let open = literal_start + found;
        match parse_at(rest, open, known) {
            Some(Ok((directive, end))) => {
                if open > 0 {
                    segments.push(Segment::Text(&rest[..open]));
                }
                segments.push(Segment::Directive(directive));
                rest = &rest[end..];
                literal_start = 0;
            }
            Some(Err(e)) => {
                tracing::debug!("Leaving directive as text: {}", e);
                literal_start = open + 1;
            }
            None => literal_start = open + 1,
        }
    }

    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    segments
}

/// Parse a directive opening at byte `open` of `src`.
/// Returns the directive and the byte offset just past it.
fn parse_at<'a>(
    src: &'a str,
    open: usize,
    known: &[&str],
) -> Option<Result<(Directive<'a>, usize), DirectiveError>> {
    let after_bracket = &src[open + 1..];
    let name_len = after_bracket
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(after_bracket.len());
    let name = &after_bracket[..name_len];

    if name.is_empty() || !known.contains(&name) {
        return None;
    }
    // `[iteras-if-logged-in-link` must not match `iteras-if-logged-in`
    match after_bracket[name_len..].chars().next() {
        Some(c) if c.is_whitespace() || c == ']' || c == '/' => {}
        _ => return None,
    }

    let tag_start = open + 1 + name_len;
    let (attrs, consumed, self_closed) = match parse_tag(name, &src[tag_start..]) {
        Ok(parsed) => parsed,
        Err(e) => return Some(Err(e)),
    };
    let mut end = tag_start + consumed;

    let mut body = None;
    if !self_closed {
        let closing = format!("[/{}]", name);
        if let Some(offset) = src[end..].find(&closing) {
            body = Some(&src[end..end + offset]);
            end += offset + closing.len();
        }
    }

    Some(Ok((Directive { name, attrs, body }, end)))
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        self.take_while(char::is_whitespace);
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
        &self.src[start..self.pos]
    }
}

/// Parse attributes up to and including the closing `]`
fn parse_tag(name: &str, src: &str) -> Result<(Attributes, usize, bool), DirectiveError> {
    let mut cur = Cursor { src, pos: 0 };
    let mut attrs = Attributes::new();

    loop {
        cur.skip_whitespace();
        match cur.peek() {
            None => return Err(DirectiveError::Unterminated(name.to_string())),
            Some(']') => {
                cur.bump();
                return Ok((attrs, cur.pos, false));
            }
            Some('/') => {
                cur.bump();
                cur.skip_whitespace();
                if cur.peek() == Some(']') {
                    cur.bump();
                    return Ok((attrs, cur.pos, true));
                }
                return Err(DirectiveError::BadAttribute {
                    name: name.to_string(),
                    offset: cur.pos,
                });
            }
            Some(quote @ ('"' | '\'')) => {
                let value = read_quoted(&mut cur, quote, name)?;
                attrs.push_positional(value);
            }
            Some(_) => {
                let key = cur.take_while(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
                if key.is_empty() {
                    return Err(DirectiveError::BadAttribute {
                        name: name.to_string(),
                        offset: cur.pos,
                    });
                }
                cur.skip_whitespace();
                if cur.peek() != Some('=') {
                    attrs.push_positional(key.to_string());
                    continue;
                }
                cur.bump();
                cur.skip_whitespace();
                let value = match cur.peek() {
                    Some(quote @ ('"' | '\'')) => read_quoted(&mut cur, quote, name)?,
                    _ => cur
                        .take_while(|c| !c.is_whitespace() && c != ']')
                        .to_string(),
                };
                attrs.insert(key, value);
            }
        }
    }
}

fn read_quoted(cur: &mut Cursor<'_>, quote: char, name: &str) -> Result<String, DirectiveError> {
    cur.bump();
    let value = cur.take_while(|c| c != quote);
    if cur.bump() != Some(quote) {
        return Err(DirectiveError::UnterminatedQuote(name.to_string()));
    }
    Ok(value.to_string())
}
