//! Parser for the OCR engine's per-line output
//!
//! The engine prints one detection per line:
//!
//! ```text
//! ([[10, 20], [50, 20], [50, 40], [10, 40]], 'Calories', np.float64(0.95))
//! ```
//!
//! Numbers may be wrapped in type decorations such as `np.int32(..)`. The
//! wrapper name is noise; only the literal inside it matters. The outer tuple
//! parentheses are optional.

use super::detection::{Detection, Point};
use super::error::LineParseError;

/// Parse one line of engine output into a [`Detection`]
pub fn parse_detection_line(line: &str) -> Result<Detection, LineParseError> {
    let mut tok = Tokenizer::new(line);
    tok.parse().map_err(|reason| LineParseError::new(line, reason))
}

/// Parse every non-blank line, splitting successes from failures
pub fn parse_engine_output(output: &str) -> (Vec<Detection>, Vec<LineParseError>) {
    let mut detections = Vec::new();
    let mut errors = Vec::new();

    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        match parse_detection_line(line) {
            Ok(d) => detections.push(d),
            Err(e) => errors.push(e),
        }
    }

    (detections, errors)
}

type TokResult<T> = Result<T, &'static str>;

struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn parse(&mut self) -> TokResult<Detection> {
        self.skip_while(|c| c == '(' || c.is_whitespace());
        let polygon = self.point_list()?;

        self.skip_ws();
        self.expect(',', "expected ',' after point list")?;
        self.skip_ws();
        let text = self.quoted()?;

        self.skip_ws();
        self.expect(',', "expected ',' after text")?;
        let confidence = decorated_number(self.rest())?;

        Ok(Detection::new(text.trim(), confidence, polygon))
    }

    /// `[[x,y],[x,y],[x,y],[x,y]]`
    fn point_list(&mut self) -> TokResult<[Point; 4]> {
        self.expect('[', "expected '[' opening point list")?;

        let mut points = [Point::new(0.0, 0.0); 4];
        for (i, slot) in points.iter_mut().enumerate() {
            if i > 0 {
                self.skip_ws();
                self.expect(',', "expected ',' between points")?;
            }
            self.skip_ws();
            self.expect('[', "expected '[' opening point")?;
            let x = decorated_number(self.until_delimiter())?;
            self.expect(',', "expected ',' between coordinates")?;
            let y = decorated_number(self.until_delimiter())?;
            self.expect(']', "expected ']' closing point")?;
            *slot = Point::new(x, y);
        }

        self.skip_ws();
        self.expect(']', "expected ']' closing point list")?;
        Ok(points)
    }

    /// Single- or double-quoted string with backslash escapes
    fn quoted(&mut self) -> TokResult<String> {
        let quote = match self.peek() {
            Some(c @ ('\'' | '"')) => c,
            _ => return Err("expected quoted text"),
        };
        self.bump();

        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err("unterminated quoted text"),
                Some(c) if c == quote => return Ok(text),
                Some('\\') => match self.bump() {
                    None => return Err("unterminated quoted text"),
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some(c @ ('\\' | '\'' | '"')) => text.push(c),
                    Some(c) => {
                        text.push('\\');
                        text.push(c);
                    }
                },
                Some(c) => text.push(c),
            }
        }
    }

    /// Consume up to the next ',' or ']' outside any parentheses
    fn until_delimiter(&mut self) -> &'a str {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            match c {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ',' | ']' if depth == 0 => break,
                _ => {}
            }
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn expect(&mut self, want: char, reason: &'static str) -> TokResult<()> {
        match self.peek() {
            Some(c) if c == want => {
                self.bump();
                Ok(())
            }
            _ => Err(reason),
        }
    }

    fn skip_ws(&mut self) {
        self.skip_while(char::is_whitespace);
    }

    fn skip_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
    }
}

/// Strip any `name(...)` wrappers around a numeric literal and parse it
fn decorated_number(token: &str) -> TokResult<f64> {
    let inner = match token.rfind('(') {
        Some(i) => &token[i + 1..],
        None => token,
    };
    let literal = inner
        .trim_end_matches(|c: char| c == ')' || c.is_whitespace())
        .trim();

    if literal.is_empty() {
        return Err("missing number");
    }
    let value: f64 = literal.parse().map_err(|_| "invalid number")?;
    if !value.is_finite() {
        return Err("non-finite number");
    }
    Ok(value)
}
