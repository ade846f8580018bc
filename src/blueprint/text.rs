use std::fmt::Write;

use serde_json::{Map, Number, Value};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(Number),
    BraceStart,
    BraceEnd,
    BracketStart,
    BracketEnd,
    Colon,
    Comma,
    Eof,
}

/// Reads the relaxed object-literal notation blueprints are written in:
/// unquoted keys, single or double quoted strings, trailing commas and
/// `//` or `/* */` comments. Plain JSON is accepted as well.
pub fn parse(text: &str) -> eyre::Result<Value> {
    let mut parser = TextParser::new(text);
    let value = parser.parse_value()?;

    match parser.next()? {
        Token::Eof => Ok(value),
        token => eyre::bail!("unexpected {token:?} after value at offset {}", parser.ptr),
    }
}

// same limit as serde_json
const MAX_DEPTH: usize = 128;

struct TextParser {
    chars: Vec<char>,
    ptr: usize,
    depth: usize,
}

impl TextParser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            ptr: 0,
            depth: 0,
        }
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.chars.get(self.ptr + offset).copied()
    }

    fn next_char(&mut self) -> Option<char> {
        let ch = self.peek_char(0);
        if ch.is_some() {
            self.ptr += 1;
        }
        ch
    }

    fn skip_ws(&mut self) -> eyre::Result<()> {
        loop {
            match (self.peek_char(0), self.peek_char(1)) {
                (Some(ch), _) if ch.is_whitespace() => self.ptr += 1,
                (Some('/'), Some('/')) => {
                    while !matches!(self.next_char(), Some('\n') | None) {}
                }
                (Some('/'), Some('*')) => {
                    let start = self.ptr;
                    self.ptr += 2;
                    loop {
                        match (self.next_char(), self.peek_char(0)) {
                            (Some('*'), Some('/')) => {
                                self.ptr += 1;
                                break;
                            }
                            (None, _) => eyre::bail!("unterminated comment at offset {start}"),
                            _ => {}
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next(&mut self) -> eyre::Result<Token> {
        self.skip_ws()?;

        let start = self.ptr;
        let Some(ch) = self.next_char() else {
            return Ok(Token::Eof);
        };

        let token = match ch {
            '{' => Token::BraceStart,
            '}' => Token::BraceEnd,
            '[' => Token::BracketStart,
            ']' => Token::BracketEnd,
            ':' => Token::Colon,
            ',' => Token::Comma,
            '"' | '\'' => Token::Str(self.read_string(ch, start)?),
            '-' | '0'..='9' => Token::Number(self.read_number(start)?),
            ch if is_ident_char(ch) => {
                let mut ident = ch.to_string();
                while let Some(ch) = self.peek_char(0).filter(|ch| is_ident_char(*ch)) {
                    ident.push(ch);
                    self.ptr += 1;
                }
                Token::Ident(ident)
            }
            ch => eyre::bail!("unexpected character `{ch}` at offset {start}"),
        };

        Ok(token)
    }

    fn lookup(&mut self) -> eyre::Result<Token> {
        let ptr = self.ptr;
        let token = self.next();
        self.ptr = ptr;
        token
    }

    fn read_string(&mut self, quote: char, start: usize) -> eyre::Result<String> {
        let mut result = String::new();

        loop {
            let Some(ch) = self.next_char() else {
                eyre::bail!("unterminated string at offset {start}");
            };

            match ch {
                ch if ch == quote => return Ok(result),
                '\\' => {
                    let escaped = match self.next_char() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('b') => '\u{8}',
                        Some('f') => '\u{c}',
                        Some('0') => '\0',
                        Some('u') => self.read_unicode_escape()?,
                        Some(ch @ ('\\' | '/' | '"' | '\'')) => ch,
                        Some(ch) => eyre::bail!("unknown escape `\\{ch}` at offset {}", self.ptr),
                        None => eyre::bail!("unterminated string at offset {start}"),
                    };
                    result.push(escaped);
                }
                ch => result.push(ch),
            }
        }
    }

    fn read_unicode_escape(&mut self) -> eyre::Result<char> {
        let code = self.read_hex4()?;

        // surrogate pair, as emitted by JSON encoders
        if (0xd800..0xdc00).contains(&code) {
            if self.next_char() != Some('\\') || self.next_char() != Some('u') {
                eyre::bail!("unpaired surrogate at offset {}", self.ptr);
            }
            let low = self.read_hex4()?;
            if !(0xdc00..0xe000).contains(&low) {
                eyre::bail!("invalid low surrogate `{low:04x}` at offset {}", self.ptr);
            }
            let code = 0x10000 + ((code - 0xd800) << 10) + (low - 0xdc00);
            return char::from_u32(code)
                .ok_or_else(|| eyre::eyre!("invalid surrogate pair at offset {}", self.ptr));
        }

        char::from_u32(code).ok_or_else(|| eyre::eyre!("invalid code point at offset {}", self.ptr))
    }

    fn read_hex4(&mut self) -> eyre::Result<u32> {
        let digits = (0..4).filter_map(|_| self.next_char()).collect::<String>();
        if digits.len() != 4 || !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
            eyre::bail!("invalid unicode escape `{digits}` at offset {}", self.ptr);
        }
        u32::from_str_radix(&digits, 16)
            .map_err(|_| eyre::eyre!("invalid unicode escape `{digits}` at offset {}", self.ptr))
    }

    fn read_number(&mut self, start: usize) -> eyre::Result<Number> {
        while let Some(ch) = self
            .peek_char(0)
            .filter(|ch| ch.is_ascii_digit() || matches!(ch, '.' | 'e' | 'E' | '+' | '-'))
        {
            // `-` and `+` only follow an exponent marker
            if matches!(ch, '+' | '-') && !matches!(self.chars[self.ptr - 1], 'e' | 'E') {
                break;
            }
            self.ptr += 1;
        }

        let literal = self.chars[start..self.ptr].iter().collect::<String>();

        if let Ok(value) = literal.parse::<i64>() {
            return Ok(value.into());
        }
        if let Ok(value) = literal.parse::<u64>() {
            return Ok(value.into());
        }

        literal
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .ok_or_else(|| eyre::eyre!("invalid number `{literal}` at offset {start}"))
    }

    fn parse_value(&mut self) -> eyre::Result<Value> {
        let offset = self.ptr;

        let value = match self.next()? {
            Token::BraceStart => self.nested(offset, Self::parse_object)?,
            Token::BracketStart => self.nested(offset, Self::parse_array)?,
            Token::Str(value) => Value::String(value),
            Token::Number(value) => Value::Number(value),
            Token::Ident(ident) => match ident.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                "null" => Value::Null,
                _ => eyre::bail!("unexpected identifier `{ident}` at offset {offset}"),
            },
            token => eyre::bail!("expected a value, found {token:?} at offset {offset}"),
        };

        Ok(value)
    }

    fn nested(
        &mut self,
        offset: usize,
        parse: fn(&mut Self) -> eyre::Result<Value>,
    ) -> eyre::Result<Value> {
        if self.depth >= MAX_DEPTH {
            eyre::bail!("nesting deeper than {MAX_DEPTH} levels at offset {offset}");
        }

        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn parse_object(&mut self) -> eyre::Result<Value> {
        let mut map = Map::new();

        loop {
            let offset = self.ptr;
            let key = match self.next()? {
                Token::BraceEnd => break,
                Token::Ident(key) | Token::Str(key) => key,
                Token::Number(key) => key.to_string(),
                token => eyre::bail!("expected a key, found {token:?} at offset {offset}"),
            };

            if self.next()? != Token::Colon {
                eyre::bail!("expected `:` after key `{key}`");
            }

            let value = self.parse_value()?;
            if map.insert(key.clone(), value).is_some() {
                eyre::bail!("duplicate key `{key}`");
            }

            match self.next()? {
                Token::Comma => continue,
                Token::BraceEnd => break,
                token => eyre::bail!("expected `,` or `}}`, found {token:?} at offset {}", self.ptr),
            }
        }

        Ok(Value::Object(map))
    }

    fn parse_array(&mut self) -> eyre::Result<Value> {
        let mut values = Vec::new();

        loop {
            if self.lookup()? == Token::BracketEnd {
                self.next()?;
                break;
            }

            values.push(self.parse_value()?);

            match self.next()? {
                Token::Comma => continue,
                Token::BracketEnd => break,
                token => eyre::bail!("expected `,` or `]`, found {token:?} at offset {}", self.ptr),
            }
        }

        Ok(Value::Array(values))
    }
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '_' | '$')
}

fn is_ident(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .map_or(false, |ch| is_ident_char(ch) && !ch.is_ascii_digit())
        && chars.all(is_ident_char)
        && !matches!(key, "true" | "false" | "null")
}

/// Writes a value back in the relaxed notation, one entry per line with
/// trailing commas. Small objects such as positions and gate specs stay on
/// one line.
pub fn to_text(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value, 0);
    out.push('\n');
    out
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn is_short_list(values: &[Value]) -> bool {
    values.iter().all(is_scalar) && values.len() <= 4
}

fn is_compact(value: &Value) -> bool {
    match value {
        Value::Array(values) => is_short_list(values),
        value => is_scalar(value),
    }
}

fn write_key(out: &mut String, key: &str) {
    if is_ident(key) {
        out.push_str(key);
    } else {
        write_string(out, key);
    }
}

fn write_string(out: &mut String, value: &str) {
    out.push_str(&Value::String(value.to_string()).to_string());
}

fn write_value(out: &mut String, value: &Value, depth: usize) {
    let indent = "  ".repeat(depth + 1);
    let closing = "  ".repeat(depth);

    match value {
        Value::String(value) => write_string(out, value),
        Value::Array(values) if values.is_empty() => out.push_str("[]"),
        Value::Object(map) if map.is_empty() => out.push_str("{}"),
        Value::Array(values) if is_short_list(values) => {
            out.push('[');
            for (index, value) in values.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                write_value(out, value, depth);
            }
            out.push(']');
        }
        Value::Object(map) if map.values().all(is_compact) && map.len() <= 3 => {
            out.push_str("{ ");
            for (index, (key, value)) in map.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                write_key(out, key);
                out.push_str(": ");
                write_value(out, value, depth);
            }
            out.push_str(" }");
        }
        Value::Array(values) => {
            out.push_str("[\n");
            for value in values {
                out.push_str(&indent);
                write_value(out, value, depth + 1);
                out.push_str(",\n");
            }
            out.push_str(&closing);
            out.push(']');
        }
        Value::Object(map) => {
            out.push_str("{\n");
            for (key, value) in map {
                out.push_str(&indent);
                write_key(out, key);
                out.push_str(": ");
                write_value(out, value, depth + 1);
                out.push_str(",\n");
            }
            out.push_str(&closing);
            out.push('}');
        }
        scalar => {
            let _ = write!(out, "{scalar}");
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{parse, to_text};

    #[test]
    fn unittest_text_relaxed_literal() -> eyre::Result<()> {
        let value = parse(
            r#"
            // starter circuit
            {
                declaration: {
                    a: "Switch",
                    clk: { type: 'Clock', args: [250] },
                    "out 1": "Lamp",
                },
                /* layout */
                positions: { a: { x: -10, y: 2.5 } },
                connections: ["a to out 1",],
            }
            "#,
        )?;

        assert_eq!(
            value,
            json!({
                "declaration": {
                    "a": "Switch",
                    "clk": { "type": "Clock", "args": [250] },
                    "out 1": "Lamp",
                },
                "positions": { "a": { "x": -10, "y": 2.5 } },
                "connections": ["a to out 1"],
            })
        );

        let keys = value["declaration"]
            .as_object()
            .map(|map| map.keys().cloned().collect::<Vec<_>>());
        assert_eq!(
            keys,
            Some(vec!["a".to_string(), "clk".to_string(), "out 1".to_string()])
        );

        Ok(())
    }

    #[test]
    fn unittest_text_strings_and_json() -> eyre::Result<()> {
        let value = parse(r#"{"name": "🔴 Probe", 'quote': 'it\'s', "esc": "é\n", "pair": "💡"}"#)?;

        assert_eq!(value["name"], "🔴 Probe");
        assert_eq!(value["quote"], "it's");
        assert_eq!(value["esc"], "é\n");
        assert_eq!(value["pair"], "💡");

        Ok(())
    }

    #[test]
    fn unittest_text_errors() {
        for text in [
            "{ a: }",
            "{ a: 1 b: 2 }",
            "{ a: 'open }",
            "[1, 2",
            "{ a: 1, a: 2 }",
            "{ a: undefined }",
            "{} {}",
            "/* open",
            r#""\ud83d\u0041""#,
            r#""\ud83d\ud83d""#,
            r#""\u+041""#,
            r#""\u41""#,
        ] {
            assert!(parse(text).is_err(), "{text}");
        }

        assert_eq!(parse(r#""\ud83d\ude00""#).ok(), Some(json!("😀")));
    }

    #[test]
    fn unittest_text_nesting_limit() -> eyre::Result<()> {
        let deepest = format!("{}{}", "[".repeat(128), "]".repeat(128));
        parse(&deepest)?;

        let too_deep = format!("{}{}", "[".repeat(129), "]".repeat(129));
        assert!(parse(&too_deep).is_err());

        assert!(parse(&"[".repeat(200_000)).is_err());
        assert!(parse(&"{ a: ".repeat(200_000)).is_err());
        Ok(())
    }

    #[test]
    fn unittest_text_write_then_read() -> eyre::Result<()> {
        let value = json!({
            "declaration": {
                "in_1": { "type": "Input", "args": ["In A"] },
                "2hz": "2Hz Clock",
            },
            "positions": { "in_1": { "x": 1.5, "y": -3 } },
            "connections": ["in_1:C to out:A"],
        });

        let text = to_text(&value);
        assert!(text.contains("in_1: { type: \"Input\", args: [\"In A\"] },"));
        assert!(text.contains("\"2hz\": \"2Hz Clock\","));
        assert!(text.contains("positions: {\n    in_1: { x: 1.5, y: -3 },\n  },"));

        assert_eq!(parse(&text)?, value);
        Ok(())
    }
}
