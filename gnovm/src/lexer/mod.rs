//! Lexer implementation using logos
//!
//! Newlines are significant only through automatic semicolon insertion: a
//! line break after an identifier, literal, one of the keywords `break`,
//! `continue`, `fallthrough` and `return`, `++`, `--`, or a closing
//! bracket becomes a `;`.

mod token;

pub use token::Token;

use crate::ast::{Pos, Span};
use crate::error::{CompileError, Result};
use logos::Logos;

/// Maps byte offsets to line/column positions.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn pos(&self, offset: usize) -> Pos {
        let line = self.starts.partition_point(|&s| s <= offset);
        let start = self.starts[line - 1];
        Pos::new(line as u32, (offset - start + 1) as u32)
    }

    fn span(&self, range: std::ops::Range<usize>) -> Span {
        Span::new(self.pos(range.start), self.pos(range.end))
    }
}

/// Tokenize source code. The result always ends with [`Token::Eof`].
pub fn tokenize(file: &str, source: &str) -> Result<Vec<(Token, Span)>> {
    let index = LineIndex::new(source);
    let mut tokens: Vec<(Token, Span)> = Vec::new();
    let mut lexer = Token::lexer(source);

    let needs_semi = |tokens: &[(Token, Span)]| tokens.last().is_some_and(|(t, _)| t.ends_statement());

    while let Some(result) = lexer.next() {
        let span = index.span(lexer.span());
        match result {
            Ok(Token::Newline) | Ok(Token::BlockComment(true)) => {
                if needs_semi(&tokens) {
                    tokens.push((Token::Semi, span));
                }
            }
            Ok(Token::BlockComment(false)) => {}
            Ok(token) => tokens.push((token, span)),
            Err(_) => {
                return Err(CompileError::lexer(
                    format!("unexpected character: {:?}", lexer.slice()),
                    file,
                    span,
                ));
            }
        }
    }

    let end = index.span(source.len()..source.len());
    if needs_semi(&tokens) {
        tokens.push((Token::Semi, end));
    }
    tokens.push((Token::Eof, end));
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize("test.gno", source)
            .unwrap()
            .into_iter()
            .map(|(t, _)| t)
            .collect()
    }

    #[test]
    fn test_tokenize_empty() {
        assert_eq!(kinds(""), vec![Token::Eof]);
    }

    #[test]
    fn test_tokenize_keywords() {
        assert_eq!(
            kinds("package func var for"),
            vec![Token::Package, Token::Func, Token::Var, Token::For, Token::Eof]
        );
    }

    #[test]
    fn test_semicolon_insertion() {
        let toks = kinds("x := 1\ny++\nreturn\n}\n");
        assert_eq!(
            toks,
            vec![
                Token::Ident("x".into()),
                Token::Define,
                Token::Int("1".into()),
                Token::Semi,
                Token::Ident("y".into()),
                Token::Inc,
                Token::Semi,
                Token::Return,
                Token::Semi,
                Token::RBrace,
                Token::Semi,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_no_semicolon_after_operator() {
        let toks = kinds("a +\nb");
        assert_eq!(
            toks,
            vec![
                Token::Ident("a".into()),
                Token::Plus,
                Token::Ident("b".into()),
                Token::Semi,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_numeric_literals() {
        assert_eq!(kinds("0x2a")[0], Token::Int("0x2a".into()));
        assert_eq!(kinds("1.5")[0], Token::Float("1.5".into()));
        assert_eq!(kinds(".5")[0], Token::Float(".5".into()));
        assert_eq!(kinds("1e3")[0], Token::Float("1e3".into()));
        assert_eq!(kinds("0x1p-2")[0], Token::Float("0x1p-2".into()));
        assert_eq!(kinds("42b0")[0], Token::Int("42b0".into()));
    }

    #[test]
    fn test_string_and_char_literals() {
        assert_eq!(kinds(r#""a\"b""#)[0], Token::Str(r#""a\"b""#.into()));
        assert_eq!(kinds("`raw\nline`")[0], Token::Str("`raw\nline`".into()));
        assert_eq!(kinds(r"'\n'")[0], Token::Char(r"'\n'".into()));
    }

    #[test]
    fn test_multiline_block_comment_inserts_semicolon() {
        let toks = kinds("x /* a\nb */ y");
        assert_eq!(toks[1], Token::Semi);
        let toks = kinds("x /* a */ + y");
        assert_eq!(toks[1], Token::Plus);
    }

    #[test]
    fn test_tokenize_spans() {
        let toks = tokenize("test.gno", "func main\n  x").unwrap();
        assert_eq!(toks[0].1, Span::at(1, 1, 1, 5));
        assert_eq!(toks[1].1, Span::at(1, 6, 1, 10));
        assert_eq!(toks[3].1.pos, Pos::new(2, 3));
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("test.gno", "x := #").unwrap_err();
        assert!(err.to_string().contains("unexpected character"));
    }
}
