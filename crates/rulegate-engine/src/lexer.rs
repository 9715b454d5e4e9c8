//! Scanner for the constrained rule dialect.
//!
//! Produces a flat token stream with line numbers for error reporting.
//! Comments (`//` and `/* */`) and whitespace are skipped. There are no
//! regex or template literals in the dialect, so `/` is always division.

use std::fmt;

/// A single token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Number literal.
    Num(f64),
    /// String literal (already unescaped).
    Str(String),
    /// Identifier or keyword.
    Ident(String),

    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `;`
    Semi,
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// `:`
    Colon,
    /// `?`
    Question,
    /// `=>`
    Arrow,

    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,

    /// `=`
    Assign,
    /// `+=`
    PlusAssign,
    /// `-=`
    MinusAssign,
    /// `*=`
    StarAssign,
    /// `/=`
    SlashAssign,
    /// `%=`
    PercentAssign,

    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `===`
    StrictEq,
    /// `!==`
    StrictNotEq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,

    /// `&&`
    AndAnd,
    /// `||`
    OrOr,
    /// `!`
    Not,
    /// `++`
    PlusPlus,
    /// `--`
    MinusMinus,

    /// End of input.
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Num(n) => write!(f, "{n}"),
            Token::Str(s) => write!(f, "\"{s}\""),
            Token::Ident(name) => write!(f, "{name}"),
            Token::Eof => write!(f, "end of input"),
            other => {
                let text = match other {
                    Token::LParen => "(",
                    Token::RParen => ")",
                    Token::LBrace => "{",
                    Token::RBrace => "}",
                    Token::LBracket => "[",
                    Token::RBracket => "]",
                    Token::Semi => ";",
                    Token::Comma => ",",
                    Token::Dot => ".",
                    Token::Colon => ":",
                    Token::Question => "?",
                    Token::Arrow => "=>",
                    Token::Plus => "+",
                    Token::Minus => "-",
                    Token::Star => "*",
                    Token::Slash => "/",
                    Token::Percent => "%",
                    Token::Assign => "=",
                    Token::PlusAssign => "+=",
                    Token::MinusAssign => "-=",
                    Token::StarAssign => "*=",
                    Token::SlashAssign => "/=",
                    Token::PercentAssign => "%=",
                    Token::Eq => "==",
                    Token::NotEq => "!=",
                    Token::StrictEq => "===",
                    Token::StrictNotEq => "!==",
                    Token::Lt => "<",
                    Token::Le => "<=",
                    Token::Gt => ">",
                    Token::Ge => ">=",
                    Token::AndAnd => "&&",
                    Token::OrOr => "||",
                    Token::Not => "!",
                    Token::PlusPlus => "++",
                    Token::MinusMinus => "--",
                    _ => unreachable!(),
                };
                write!(f, "{text}")
            }
        }
    }
}

/// A token with its source line (1-based).
#[derive(Debug, Clone)]
pub struct Spanned {
    /// The token.
    pub token: Token,
    /// Source line.
    pub line: u32,
}

/// Tokenize `source`, returning an error message on malformed input.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut pos = 0;
    let mut line: u32 = 1;

    macro_rules! push {
        ($token:expr) => {
            tokens.push(Spanned {
                token: $token,
                line,
            })
        };
    }

    while pos < chars.len() {
        let c = chars[pos];

        if c == '\n' {
            line += 1;
            pos += 1;
            continue;
        }
        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        // Comments
        if c == '/' && chars.get(pos + 1) == Some(&'/') {
            while pos < chars.len() && chars[pos] != '\n' {
                pos += 1;
            }
            continue;
        }
        if c == '/' && chars.get(pos + 1) == Some(&'*') {
            pos += 2;
            loop {
                match (chars.get(pos), chars.get(pos + 1)) {
                    (Some('*'), Some('/')) => {
                        pos += 2;
                        break;
                    }
                    (Some('\n'), _) => {
                        line += 1;
                        pos += 1;
                    }
                    (Some(_), _) => pos += 1,
                    (None, _) => return Err(format!("line {line}: unterminated block comment")),
                }
            }
            continue;
        }

        // Strings
        if c == '"' || c == '\'' {
            let quote = c;
            let start_line = line;
            pos += 1;
            let mut text = String::new();
            loop {
                match chars.get(pos) {
                    None | Some('\n') => {
                        return Err(format!("line {start_line}: unterminated string literal"))
                    }
                    Some(&ch) if ch == quote => {
                        pos += 1;
                        break;
                    }
                    Some('\\') => {
                        pos += 1;
                        let escaped = chars
                            .get(pos)
                            .ok_or_else(|| format!("line {line}: unterminated escape"))?;
                        match escaped {
                            'n' => text.push('\n'),
                            't' => text.push('\t'),
                            'r' => text.push('\r'),
                            '0' => text.push('\0'),
                            'u' => {
                                let digits: String =
                                    chars.get(pos + 1..pos + 5).unwrap_or_default().iter().collect();
                                let code = u32::from_str_radix(&digits, 16).map_err(|_| {
                                    format!("line {line}: invalid unicode escape \\u{digits}")
                                })?;
                                text.push(char::from_u32(code).ok_or_else(|| {
                                    format!("line {line}: invalid unicode escape \\u{digits}")
                                })?);
                                pos += 4;
                            }
                            other => text.push(*other),
                        }
                        pos += 1;
                    }
                    Some(&ch) => {
                        text.push(ch);
                        pos += 1;
                    }
                }
            }
            push!(Token::Str(text));
            continue;
        }

        // Numbers
        if c.is_ascii_digit() {
            let start = pos;
            if c == '0' && matches!(chars.get(pos + 1), Some('x') | Some('X')) {
                pos += 2;
                let hex_start = pos;
                while pos < chars.len() && chars[pos].is_ascii_hexdigit() {
                    pos += 1;
                }
                let digits: String = chars[hex_start..pos].iter().collect();
                let value = u64::from_str_radix(&digits, 16)
                    .map_err(|_| format!("line {line}: invalid hex literal"))?;
                push!(Token::Num(value as f64));
                continue;
            }
            while pos < chars.len() && chars[pos].is_ascii_digit() {
                pos += 1;
            }
            if chars.get(pos) == Some(&'.') && matches!(chars.get(pos + 1), Some(d) if d.is_ascii_digit())
            {
                pos += 1;
                while pos < chars.len() && chars[pos].is_ascii_digit() {
                    pos += 1;
                }
            }
            if matches!(chars.get(pos), Some('e') | Some('E')) {
                let mut lookahead = pos + 1;
                if matches!(chars.get(lookahead), Some('+') | Some('-')) {
                    lookahead += 1;
                }
                if matches!(chars.get(lookahead), Some(d) if d.is_ascii_digit()) {
                    pos = lookahead;
                    while pos < chars.len() && chars[pos].is_ascii_digit() {
                        pos += 1;
                    }
                }
            }
            let text: String = chars[start..pos].iter().collect();
            let value: f64 = text
                .parse()
                .map_err(|_| format!("line {line}: invalid number literal `{text}`"))?;
            push!(Token::Num(value));
            continue;
        }

        // Identifiers / keywords
        if c.is_ascii_alphabetic() || c == '_' || c == '$' {
            let start = pos;
            while pos < chars.len()
                && (chars[pos].is_ascii_alphanumeric() || chars[pos] == '_' || chars[pos] == '$')
            {
                pos += 1;
            }
            push!(Token::Ident(chars[start..pos].iter().collect()));
            continue;
        }

        // Operators and punctuation, longest match first.
        let two: String = chars[pos..chars.len().min(pos + 2)].iter().collect();
        let three: String = chars[pos..chars.len().min(pos + 3)].iter().collect();

        let (token, width) = match three.as_str() {
            "===" => (Token::StrictEq, 3),
            "!==" => (Token::StrictNotEq, 3),
            _ => match two.as_str() {
                "=>" => (Token::Arrow, 2),
                "==" => (Token::Eq, 2),
                "!=" => (Token::NotEq, 2),
                "<=" => (Token::Le, 2),
                ">=" => (Token::Ge, 2),
                "&&" => (Token::AndAnd, 2),
                "||" => (Token::OrOr, 2),
                "++" => (Token::PlusPlus, 2),
                "--" => (Token::MinusMinus, 2),
                "+=" => (Token::PlusAssign, 2),
                "-=" => (Token::MinusAssign, 2),
                "*=" => (Token::StarAssign, 2),
                "/=" => (Token::SlashAssign, 2),
                "%=" => (Token::PercentAssign, 2),
                _ => match c {
                    '(' => (Token::LParen, 1),
                    ')' => (Token::RParen, 1),
                    '{' => (Token::LBrace, 1),
                    '}' => (Token::RBrace, 1),
                    '[' => (Token::LBracket, 1),
                    ']' => (Token::RBracket, 1),
                    ';' => (Token::Semi, 1),
                    ',' => (Token::Comma, 1),
                    '.' => (Token::Dot, 1),
                    ':' => (Token::Colon, 1),
                    '?' => (Token::Question, 1),
                    '+' => (Token::Plus, 1),
                    '-' => (Token::Minus, 1),
                    '*' => (Token::Star, 1),
                    '/' => (Token::Slash, 1),
                    '%' => (Token::Percent, 1),
                    '=' => (Token::Assign, 1),
                    '<' => (Token::Lt, 1),
                    '>' => (Token::Gt, 1),
                    '!' => (Token::Not, 1),
                    other => {
                        return Err(format!("line {line}: unexpected character `{other}`"));
                    }
                },
            },
        };
        push!(token);
        pos += width;
    }

    tokens.push(Spanned {
        token: Token::Eof,
        line,
    });
    Ok(tokens)
}
