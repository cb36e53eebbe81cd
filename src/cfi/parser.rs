//! Recursive-descent parser for the base CFI grammar.

use smallvec::SmallVec;

use super::extension;
use super::{Assertion, Cfi, CfiError, CfiErrorKind, CfiOffset, CfiPath, CfiRange, CfiStep};

const PREFIX: &str = "epubcfi(";

pub(super) fn parse(input: &str) -> Result<Cfi, CfiError> {
    let leading = input.len() - input.trim_start().len();
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(Cfi::default());
    }

    // Accept the URL fragment form `#epubcfi(...)` as well.
    let (trimmed, leading) = match trimmed.strip_prefix('#') {
        Some(rest) => (rest, leading + 1),
        None => (trimmed, leading),
    };

    let (inner, origin) = if let Some(rest) = trimmed.strip_prefix(PREFIX) {
        let Some(inner) = rest.strip_suffix(')') else {
            return Err(CfiError {
                kind: CfiErrorKind::UnbalancedParenthesis,
                position: leading + trimmed.len(),
            });
        };
        (inner, leading + PREFIX.len())
    } else if trimmed.starts_with('/') {
        (trimmed, leading)
    } else {
        return Err(CfiError {
            kind: CfiErrorKind::MissingPrefix,
            position: leading,
        });
    };

    let (base, private) = extension::strip(inner, origin)?;
    if base.is_empty() {
        return Ok(Cfi {
            private,
            ..Cfi::default()
        });
    }

    let mut cursor = Cursor {
        text: base,
        pos: 0,
        origin,
    };
    let path = cursor.path(true)?;
    let range = if cursor.eat(',') {
        let start = cursor.path(false)?;
        cursor.expect(',')?;
        let end = cursor.path(false)?;
        Some(CfiRange { start, end })
    } else {
        None
    };
    if let Some(ch) = cursor.peek() {
        return Err(cursor.error(CfiErrorKind::UnexpectedCharacter(ch)));
    }

    Ok(Cfi {
        path,
        range,
        private,
    })
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
    origin: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), CfiError> {
        if self.eat(expected) {
            return Ok(());
        }
        Err(self.unexpected())
    }

    fn error(&self, kind: CfiErrorKind) -> CfiError {
        CfiError {
            kind,
            position: self.origin + self.pos,
        }
    }

    fn unexpected(&self) -> CfiError {
        match self.peek() {
            Some(ch) => self.error(CfiErrorKind::UnexpectedCharacter(ch)),
            None => self.error(CfiErrorKind::UnexpectedEnd),
        }
    }

    /// `step* offset?`. The parent path of a range must start with a step;
    /// range local paths may be a bare offset.
    fn path(&mut self, require_step: bool) -> Result<CfiPath, CfiError> {
        let mut steps: SmallVec<[CfiStep; 8]> = SmallVec::new();
        loop {
            let indirection = self.eat('!');
            if indirection || self.peek() == Some('/') {
                self.expect('/')?;
                let index = self.integer()?;
                let assertion = self.assertion()?;
                steps.push(CfiStep {
                    index,
                    assertion,
                    indirection,
                });
                continue;
            }
            break;
        }
        if require_step && steps.is_empty() {
            return Err(self.unexpected());
        }
        let offset = self.offset()?;
        if steps.is_empty() && offset.is_none() {
            return Err(self.unexpected());
        }
        Ok(CfiPath { steps, offset })
    }

    fn offset(&mut self) -> Result<Option<CfiOffset>, CfiError> {
        if self.eat(':') {
            let offset = self.integer()?;
            let assertion = self.assertion()?;
            return Ok(Some(CfiOffset::Character { offset, assertion }));
        }
        if self.eat('~') {
            let seconds = self.number()?;
            let point = if self.eat('@') {
                Some(self.point()?)
            } else {
                None
            };
            return Ok(Some(CfiOffset::Temporal { seconds, point }));
        }
        if self.eat('@') {
            let (x, y) = self.point()?;
            return Ok(Some(CfiOffset::Spatial { x, y }));
        }
        Ok(None)
    }

    fn point(&mut self) -> Result<(f64, f64), CfiError> {
        let x = self.number()?;
        self.expect(':')?;
        let y = self.number()?;
        Ok((x, y))
    }

    fn integer(&mut self) -> Result<u32, CfiError> {
        let start = self.pos;
        let digits = self.text[start..]
            .bytes()
            .take_while(u8::is_ascii_digit)
            .count();
        if digits == 0 {
            return Err(self.error(CfiErrorKind::ExpectedInteger));
        }
        let value = self.text[start..start + digits]
            .parse::<u32>()
            .map_err(|_| self.error(CfiErrorKind::ExpectedInteger))?;
        self.pos += digits;
        Ok(value)
    }

    fn number(&mut self) -> Result<f64, CfiError> {
        let start = self.pos;
        let len = self.text[start..]
            .bytes()
            .take_while(|b| b.is_ascii_digit() || *b == b'.')
            .count();
        if len == 0 {
            return Err(self.error(CfiErrorKind::ExpectedNumber));
        }
        let value = self.text[start..start + len]
            .parse::<f64>()
            .map_err(|_| self.error(CfiErrorKind::ExpectedNumber))?;
        self.pos += len;
        Ok(value)
    }

    fn assertion(&mut self) -> Result<Option<Assertion>, CfiError> {
        if self.peek() != Some('[') {
            return Ok(None);
        }
        let open = self.pos;
        let text = self.text;
        self.pos += 1;

        let mut values: Vec<String> = vec![String::new()];
        let mut params: Vec<(String, String)> = Vec::new();
        // Text accumulated for the current param key or value.
        let mut param_key: Option<String> = None;
        let mut in_params = false;
        let mut current = String::new();
        let mut escaped = false;

        for (offset, ch) in text[self.pos..].char_indices() {
            if escaped {
                current.push(ch);
                escaped = false;
                continue;
            }
            match ch {
                '^' => escaped = true,
                ']' => {
                    self.pos += offset + 1;
                    if in_params {
                        push_param(&mut params, param_key.take(), current);
                    } else if let Some(last) = values.last_mut() {
                        *last = current;
                    }
                    let values = if values.len() == 1 && values[0].is_empty() && !params.is_empty()
                    {
                        Vec::new()
                    } else {
                        values
                    };
                    return Ok(Some(Assertion { values, params }));
                }
                ',' if !in_params => {
                    if let Some(last) = values.last_mut() {
                        *last = core::mem::take(&mut current);
                    }
                    values.push(String::new());
                }
                ';' => {
                    if in_params {
                        push_param(&mut params, param_key.take(), core::mem::take(&mut current));
                    } else {
                        if let Some(last) = values.last_mut() {
                            *last = core::mem::take(&mut current);
                        }
                        in_params = true;
                    }
                }
                '=' if in_params && param_key.is_none() => {
                    param_key = Some(core::mem::take(&mut current));
                }
                _ => current.push(ch),
            }
        }

        self.pos = open;
        Err(self.error(CfiErrorKind::UnterminatedAssertion))
    }
}

fn push_param(params: &mut Vec<(String, String)>, key: Option<String>, value: String) {
    match key {
        Some(key) => params.push((key, value)),
        None if !value.is_empty() => params.push((value, String::new())),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_input_is_empty_not_error() {
        assert!(parse("").expect("empty").is_empty());
        assert!(parse("  \n").expect("blank").is_empty());
        assert!(parse("epubcfi()").expect("empty parens").is_empty());
    }

    #[test]
    fn parses_steps_indirection_and_offset() {
        let cfi = parse("epubcfi(/6/4[chap01ref]!/4[body01]/10[para05]/3:10)").expect("cfi");
        let indexes: Vec<u32> = cfi.path.steps.iter().map(|s| s.index).collect();
        assert_eq!(indexes, vec![6, 4, 4, 10, 3]);
        assert!(cfi.path.steps[2].indirection);
        assert!(!cfi.path.steps[3].indirection);
        assert_eq!(cfi.path.steps[1].id(), Some("chap01ref"));
        assert_eq!(
            cfi.path.offset,
            Some(CfiOffset::Character {
                offset: 10,
                assertion: None
            })
        );
        assert_eq!(cfi.content_steps().len(), 3);
    }

    #[test]
    fn parses_text_assertion_with_side_bias() {
        let cfi = parse("epubcfi(/6/4!/4/2/1:3[Ph^,y,mo;s=a])").expect("cfi");
        let Some(CfiOffset::Character {
            offset,
            assertion: Some(assertion),
        }) = cfi.path.offset.clone()
        else {
            panic!("expected character offset with assertion");
        };
        assert_eq!(offset, 3);
        assert_eq!(assertion.values, vec!["Ph,y".to_string(), "mo".to_string()]);
        assert_eq!(assertion.param("s"), Some("a"));
        assert_eq!(cfi.to_string(), "epubcfi(/6/4!/4/2/1:3[Ph^,y,mo;s=a])");
    }

    #[test]
    fn parses_range() {
        let cfi = parse("epubcfi(/6/4[c1]!/4/10,/2/1:1,/3:4)").expect("cfi");
        let range = cfi.range.clone().expect("range");
        assert_eq!(range.start.steps.len(), 2);
        assert_eq!(range.end.steps.len(), 1);
        assert_eq!(
            range.end.offset,
            Some(CfiOffset::Character {
                offset: 4,
                assertion: None
            })
        );
        assert_eq!(cfi.to_string(), "epubcfi(/6/4[c1]!/4/10,/2/1:1,/3:4)");
    }

    #[test]
    fn range_local_path_may_be_bare_offset() {
        let cfi = parse("epubcfi(/6/4!/4/2/1,:1,:9)").expect("cfi");
        assert!(cfi.range.is_some());
        assert_eq!(cfi.to_string(), "epubcfi(/6/4!/4/2/1,:1,:9)");
    }

    #[test]
    fn parses_temporal_and_spatial() {
        let cfi = parse("epubcfi(/6/4!/2~23.5@10:20.5)").expect("cfi");
        assert_eq!(
            cfi.path.offset,
            Some(CfiOffset::Temporal {
                seconds: 23.5,
                point: Some((10.0, 20.5))
            })
        );
        let cfi = parse("epubcfi(/6/4!/2@50:50)").expect("cfi");
        assert_eq!(cfi.path.offset, Some(CfiOffset::Spatial { x: 50.0, y: 50.0 }));
        assert_eq!(cfi.to_string(), "epubcfi(/6/4!/2@50:50)");
    }

    #[test]
    fn accepts_fragment_and_bare_forms() {
        let a = parse("#epubcfi(/6/4!/2)").expect("fragment form");
        let b = parse("/6/4!/2").expect("bare form");
        assert_eq!(a, b);
    }

    #[test]
    fn reports_malformed_syntax_with_position() {
        let cases: Vec<(&str, CfiErrorKind, usize)> = vec![
            ("chapter1", CfiErrorKind::MissingPrefix, 0),
            ("epubcfi(/6/4", CfiErrorKind::UnbalancedParenthesis, 12),
            ("epubcfi(/6/x)", CfiErrorKind::ExpectedInteger, 11),
            ("epubcfi(/6/4[abc)", CfiErrorKind::UnterminatedAssertion, 12),
            ("epubcfi(/6/4!)", CfiErrorKind::UnexpectedEnd, 13),
            ("epubcfi(/6/4?)", CfiErrorKind::UnexpectedCharacter('?'), 12),
            ("epubcfi(/6/4@1)", CfiErrorKind::UnexpectedEnd, 14),
            ("epubcfi(/6/4,/1)", CfiErrorKind::UnexpectedEnd, 15),
            ("epubcfi(:3)", CfiErrorKind::UnexpectedCharacter(':'), 8),
        ];
        for (input, kind, position) in cases {
            let err = parse(input).expect_err(input);
            assert_eq!(err.kind, kind, "{input}");
            assert_eq!(err.position, position, "{input}");
        }
    }

    #[test]
    fn huge_step_index_is_rejected() {
        let err = parse("epubcfi(/99999999999)").expect_err("overflow");
        assert_eq!(err.kind, CfiErrorKind::ExpectedInteger);
    }
}
