#[derive(Debug, PartialEq, Clone)]
pub enum TokenKind {
    // single character
    LParen, RParen,
    LBrace, RBrace,
    Comma, Dot, Minus, Plus,
    Semicolon, Slash, Star,

    // one or two characters
    Bang, BangEqual,
    Equal, EqualEqual,
    Greater, GreaterEqual,
    Less, LessEqual,

    // literals
    Identifier, String, Number,

    // keywords
    And, Class, Else, False,
    For, Fun, If, Nil, Or,
    Return, Super, This, True,
    Var, While,

    // special
    Error(String),
    EOF,
}

/// Typed payload carried by literal tokens.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Literal<'a> {
    Number(f64),
    /// String contents without the surrounding quotes.
    Str(&'a str),
}

#[derive(Debug, Clone)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub literal: Option<Literal<'a>>,
    pub line: u32,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind, lexeme: &'a str, line: u32) -> Self {
        Self {
            kind,
            lexeme,
            literal: None,
            line,
        }
    }
    pub fn with_literal(kind: TokenKind, lexeme: &'a str, literal: Literal<'a>, line: u32) -> Self {
        Self {
            kind,
            lexeme,
            literal: Some(literal),
            line,
        }
    }
    pub fn new_identifier(lexeme: &'a str, line: u32) -> Self {
        let mut chars = lexeme.chars();
        let kind = match chars.next() {
            Some('a') => Token::check_keyword(chars.as_str(), "nd", TokenKind::And),
            Some('c') => Token::check_keyword(chars.as_str(), "lass", TokenKind::Class),
            Some('e') => Token::check_keyword(chars.as_str(), "lse", TokenKind::Else),
            Some('f') => match chars.next() {
                Some('a') => Token::check_keyword(chars.as_str(), "lse", TokenKind::False),
                Some('o') => Token::check_keyword(chars.as_str(), "r", TokenKind::For),
                Some('u') => Token::check_keyword(chars.as_str(), "n", TokenKind::Fun),
                _ => TokenKind::Identifier,
            },
            Some('i') => Token::check_keyword(chars.as_str(), "f", TokenKind::If),
            Some('n') => Token::check_keyword(chars.as_str(), "il", TokenKind::Nil),
            Some('o') => Token::check_keyword(chars.as_str(), "r", TokenKind::Or),
            Some('r') => Token::check_keyword(chars.as_str(), "eturn", TokenKind::Return),
            Some('s') => Token::check_keyword(chars.as_str(), "uper", TokenKind::Super),
            Some('t') => match chars.next() {
                Some('h') => Token::check_keyword(chars.as_str(), "is", TokenKind::This),
                Some('r') => Token::check_keyword(chars.as_str(), "ue", TokenKind::True),
                _ => TokenKind::Identifier,
            },
            Some('v') => Token::check_keyword(chars.as_str(), "ar", TokenKind::Var),
            Some('w') => Token::check_keyword(chars.as_str(), "hile", TokenKind::While),
            _ => TokenKind::Identifier,
        };
        Self::new(kind, lexeme, line)
    }
    fn check_keyword(rest: &str, check: &str, kind: TokenKind) -> TokenKind {
        if rest == check {kind}
        else {TokenKind::Identifier}
    }
    pub fn error(msg: impl Into<String>, lexeme: &'a str, line: u32) -> Self {
        Self::new(TokenKind::Error(msg.into()), lexeme, line)
    }
}

/// On-demand tokenizer over one source text.
///
/// Once the end of input is reached every further call to [`Scanner::scan_token`]
/// returns another `EOF` token.
pub struct Scanner<'a> {
    source: &'a str,
    start: usize,
    current: usize,
    line: u32,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            start: 0,
            current: 0,
            line: 1,
        }
    }
    pub fn line(&self) -> u32 {
        self.line
    }
    pub fn scan_token(&mut self) -> Token<'a> {
        if let Some(error) = self.skip_whitespace() {
            return error;
        }
        self.start = self.current;

        let Some(ch) = self.advance() else {
            return self.make_token(TokenKind::EOF);
        };

        match ch {
            '(' => self.make_token(TokenKind::LParen),
            ')' => self.make_token(TokenKind::RParen),
            '{' => self.make_token(TokenKind::LBrace),
            '}' => self.make_token(TokenKind::RBrace),
            ',' => self.make_token(TokenKind::Comma),
            '.' => self.make_token(TokenKind::Dot),
            '-' => self.make_token(TokenKind::Minus),
            '+' => self.make_token(TokenKind::Plus),
            ';' => self.make_token(TokenKind::Semicolon),
            '*' => self.make_token(TokenKind::Star),
            '/' => self.make_token(TokenKind::Slash),
            '!' => {
                let kind = if self.compare('=') {TokenKind::BangEqual} else {TokenKind::Bang};
                self.make_token(kind)
            }
            '=' => {
                let kind = if self.compare('=') {TokenKind::EqualEqual} else {TokenKind::Equal};
                self.make_token(kind)
            }
            '<' => {
                let kind = if self.compare('=') {TokenKind::LessEqual} else {TokenKind::Less};
                self.make_token(kind)
            }
            '>' => {
                let kind = if self.compare('=') {TokenKind::GreaterEqual} else {TokenKind::Greater};
                self.make_token(kind)
            }
            '"' => self.string(),
            ch if ch.is_ascii_digit() => self.number(),
            ch if ch.is_ascii_alphabetic() || ch == '_' => {
                while let Some(next) = self.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {self.advance();}
                    else {break;}
                }
                Token::new_identifier(self.lexeme(), self.line)
            }
            ch => Token::error(format!("Unexpected character: '{}'.", ch), self.lexeme(), self.line),
        }
    }

    fn string(&mut self) -> Token<'a> {
        while self.peek() != Some('"') && !self.is_at_end() {
            if let Some('\n') = self.peek() {self.line += 1}
            self.advance();
        }
        if self.is_at_end() {
            return Token::error("Unterminated string.", self.lexeme(), self.line);
        }
        // closing quote
        self.advance();
        let contents = &self.source[self.start + 1..self.current - 1];
        Token::with_literal(TokenKind::String, self.lexeme(), Literal::Str(contents), self.line)
    }

    fn number(&mut self) -> Token<'a> {
        self.digits();
        if self.peek() == Some('.') && self.peek_next().is_some_and(|ch| ch.is_ascii_digit()) {
            self.advance();
            self.digits();
        }
        let lexeme = self.lexeme();
        match lexeme.parse::<f64>() {
            Ok(n) => Token::with_literal(TokenKind::Number, lexeme, Literal::Number(n), self.line),
            Err(_) => Token::error("Invalid number literal.", lexeme, self.line),
        }
    }

    fn digits(&mut self) {
        while let Some(n) = self.peek() {
            if n.is_ascii_digit() {self.advance();}
            else {break;}
        }
    }

    // Returns an error token when a block comment is malformed.
    fn skip_whitespace(&mut self) -> Option<Token<'a>> {
        loop {
            match self.peek()? {
                ' ' | '\r' | '\t' => {self.advance();}
                '\n' => {self.line += 1; self.advance();}
                '/' => match self.peek_next() {
                    Some('/') => {
                        while !self.is_at_end() && self.peek() != Some('\n') {self.advance();}
                    }
                    Some('*') => {
                        self.start = self.current;
                        self.advance();
                        self.advance();
                        if let Some(error) = self.block_comment() {
                            return Some(error);
                        }
                    }
                    _ => return None,
                },
                _ => return None,
            }
        }
    }

    // Block comments do not nest. An inner `/*` is reported once the outer
    // comment is closed so that scanning resumes after it.
    fn block_comment(&mut self) -> Option<Token<'a>> {
        let mut nested = false;
        loop {
            match self.advance() {
                None => return Some(Token::error("Unterminated block comment.", self.lexeme(), self.line)),
                Some('\n') => self.line += 1,
                Some('/') if self.peek() == Some('*') => {
                    self.advance();
                    nested = true;
                }
                Some('*') if self.peek() == Some('/') => {
                    self.advance();
                    if nested {
                        return Some(Token::error("Nested block comment.", self.lexeme(), self.line));
                    }
                    return None;
                }
                Some(_) => {}
            }
        }
    }

    fn make_token(&self, kind: TokenKind) -> Token<'a> {
        Token::new(kind, self.lexeme(), self.line)
    }

    fn lexeme(&self) -> &'a str {
        &self.source[self.start..self.current]
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.current += ch.len_utf8();
        Some(ch)
    }

    fn peek(&self) -> Option<char> {
        self.source[self.current..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.source[self.current..].chars();
        chars.next()?;
        chars.next()
    }

    fn compare(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        }
        else {
            false
        }
    }

    fn is_at_end(&self) -> bool {
        self.source.len() <= self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut scanner = Scanner::new(source);
        let mut kinds = vec![];
        loop {
            let token = scanner.scan_token();
            let done = token.kind == TokenKind::EOF;
            kinds.push(token.kind);
            if done {
                break kinds;
            }
        }
    }

    #[test]
    fn operators_prefer_the_longest_match() {
        assert_eq!(
            kinds("! != = == < <= > >="),
            vec![
                TokenKind::Bang, TokenKind::BangEqual,
                TokenKind::Equal, TokenKind::EqualEqual,
                TokenKind::Less, TokenKind::LessEqual,
                TokenKind::Greater, TokenKind::GreaterEqual,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            kinds("class classy fun funny this thistle true tru var _x"),
            vec![
                TokenKind::Class, TokenKind::Identifier,
                TokenKind::Fun, TokenKind::Identifier,
                TokenKind::This, TokenKind::Identifier,
                TokenKind::True, TokenKind::Identifier,
                TokenKind::Var, TokenKind::Identifier,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn number_literals_carry_their_value() {
        let mut scanner = Scanner::new("12.5 7. 3");
        let token = scanner.scan_token();
        assert_eq!(token.literal, Some(Literal::Number(12.5)));
        let token = scanner.scan_token();
        assert_eq!(token.literal, Some(Literal::Number(7.0)));
        assert_eq!(scanner.scan_token().kind, TokenKind::Dot);
        assert_eq!(scanner.scan_token().literal, Some(Literal::Number(3.0)));
    }

    #[test]
    fn strings_keep_raw_contents_and_count_lines() {
        let mut scanner = Scanner::new("\"a\\n\nb\" x");
        let token = scanner.scan_token();
        assert_eq!(token.kind, TokenKind::String);
        assert_eq!(token.literal, Some(Literal::Str("a\\n\nb")));
        assert_eq!(scanner.scan_token().line, 2);
    }

    #[test]
    fn unterminated_string_is_an_error_token() {
        let mut scanner = Scanner::new("\"abc");
        assert_eq!(scanner.scan_token().kind, TokenKind::Error("Unterminated string.".to_string()));
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("a // line\n/* block\n comment */ b"),
            vec![TokenKind::Identifier, TokenKind::Identifier, TokenKind::EOF]
        );
        let mut scanner = Scanner::new("/* one\ntwo */ x");
        assert_eq!(scanner.scan_token().line, 2);
    }

    #[test]
    fn nested_block_comment_is_rejected() {
        assert_eq!(
            kinds("/* outer /* inner */ x"),
            vec![TokenKind::Error("Nested block comment.".to_string()), TokenKind::Identifier, TokenKind::EOF]
        );
    }

    #[test]
    fn unterminated_block_comment() {
        assert_eq!(
            kinds("/* never closed"),
            vec![TokenKind::Error("Unterminated block comment.".to_string()), TokenKind::EOF]
        );
    }

    #[test]
    fn unexpected_character_does_not_stop_scanning() {
        assert_eq!(
            kinds("a @ b"),
            vec![
                TokenKind::Identifier,
                TokenKind::Error("Unexpected character: '@'.".to_string()),
                TokenKind::Identifier,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn end_of_input_repeats() {
        let mut scanner = Scanner::new("x");
        scanner.scan_token();
        for _ in 0..3 {
            assert_eq!(scanner.scan_token().kind, TokenKind::EOF);
        }
    }
}
