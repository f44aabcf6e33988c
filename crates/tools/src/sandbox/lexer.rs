//! Tokenizer for the sandbox script language.

use super::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Let,
    If,
    Else,
    While,
    Print,
    True,
    False,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Assign,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Bang,
}

/// A token and the 1-based line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ScriptError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c == '\n' {
            line += 1;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '#' || (c == '/' && next == Some('/')) {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        let at = move |token: Token| Spanned { token, line };
        let (token, width) = match (c, next) {
            ('=', Some('=')) => (Token::Eq, 2),
            ('!', Some('=')) => (Token::NotEq, 2),
            ('<', Some('=')) => (Token::LtEq, 2),
            ('>', Some('=')) => (Token::GtEq, 2),
            ('&', Some('&')) => (Token::And, 2),
            ('|', Some('|')) => (Token::Or, 2),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('^', _) => (Token::Caret, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('{', _) => (Token::LBrace, 1),
            ('}', _) => (Token::RBrace, 1),
            (',', _) => (Token::Comma, 1),
            (';', _) => (Token::Semi, 1),
            ('=', _) => (Token::Assign, 1),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('!', _) => (Token::Bang, 1),
            ('"', _) => {
                let (text, consumed, lines) = read_string(&chars[i + 1..], line)?;
                tokens.push(at(Token::Str(text)));
                line += lines;
                i += consumed + 1;
                continue;
            }
            (c, _) if c.is_ascii_digit() || (c == '.' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse()
                    .map_err(|_| ScriptError::syntax(line, format!("invalid number '{text}'")))?;
                tokens.push(at(Token::Number(value)));
                continue;
            }
            (c, _) if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(at(keyword(&word).unwrap_or(Token::Ident(word))));
                continue;
            }
            (c, _) => return Err(ScriptError::syntax(line, format!("unexpected character '{c}'"))),
        };
        tokens.push(at(token));
        i += width;
    }

    Ok(tokens)
}

fn keyword(word: &str) -> Option<Token> {
    Some(match word {
        "let" => Token::Let,
        "if" => Token::If,
        "else" => Token::Else,
        "while" => Token::While,
        "print" => Token::Print,
        "true" => Token::True,
        "false" => Token::False,
        _ => return None,
    })
}

/// Read a string body after the opening quote.
/// Returns the text, the chars consumed including the closing quote, and
/// the number of newlines crossed.
fn read_string(chars: &[char], line: usize) -> Result<(String, usize, usize), ScriptError> {
    let mut out = String::new();
    let mut lines = 0;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '"' => return Ok((out, i + 1, lines)),
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| ScriptError::syntax(line, "unterminated string"))?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => *other,
                });
                i += 2;
            }
            c => {
                if c == '\n' {
                    lines += 1;
                }
                out.push(c);
                i += 1;
            }
        }
    }
    Err(ScriptError::syntax(line, "unterminated string"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn operators_and_keywords() {
        assert_eq!(
            kinds("let x = 2 ^ 3 % 5; if x >= 1 && !false { print(x) }"),
            vec![
                Token::Let,
                Token::Ident("x".into()),
                Token::Assign,
                Token::Number(2.0),
                Token::Caret,
                Token::Number(3.0),
                Token::Percent,
                Token::Number(5.0),
                Token::Semi,
                Token::If,
                Token::Ident("x".into()),
                Token::GtEq,
                Token::Number(1.0),
                Token::And,
                Token::Bang,
                Token::False,
                Token::LBrace,
                Token::Print,
                Token::LParen,
                Token::Ident("x".into()),
                Token::RParen,
                Token::RBrace,
            ]
        );
    }

    #[test]
    fn strings_comments_and_lines() {
        let tokens = tokenize("# note\nprint(\"a\\n\\\"b\")\n// end\nx").unwrap();
        assert_eq!(tokens[2].token, Token::Str("a\n\"b".into()));
        assert_eq!(tokens[2].line, 2);
        assert_eq!(tokens.last().unwrap().line, 4);
    }

    #[test]
    fn errors_carry_line() {
        let err = tokenize("let a = 1;\nlet b = @;").unwrap_err();
        assert!(err.to_string().contains("line 2"));
        assert!(tokenize("print(\"open").is_err());
    }
}
