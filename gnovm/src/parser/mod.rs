//! Recursive descent parser
//!
//! Builds a FileNode in the shared [`Ast`] arena from the token stream.
//! Block nodes get spans that are unique within the file; a block node that
//! covers exactly the same text as an earlier one gets the next `num`.

use crate::ast::{
    AssignOp, Ast, AttrKey, AttrValue, BinaryOp, BranchOp, ChanDir, Ident, IncDecOp, LitKind, NodeId,
    NodeKind, Pos, Span, UnaryOp,
};
use crate::error::{CompileError, Result};
use crate::lexer::{Token, tokenize};
use std::collections::HashSet;

#[cfg(test)]
mod tests;

/// Parses one source file into a FileNode.
pub fn parse_file(ast: &mut Ast, file_name: &str, source: &str) -> Result<NodeId> {
    let tokens = tokenize(file_name, source)?;
    let mut p = Parser::new(ast, file_name, tokens);
    p.file()
}

/// Parses a standalone expression, for the REPL and tests.
pub fn parse_expr(ast: &mut Ast, source: &str) -> Result<NodeId> {
    let tokens = tokenize("<expr>", source)?;
    let mut p = Parser::new(ast, "<expr>", tokens);
    let x = p.expr()?;
    p.eat(&Token::Semi);
    p.expect(&Token::Eof)?;
    Ok(x)
}

/// The text of the `// Output:` comment block of a file, if present.
pub fn extract_output(source: &str) -> Option<String> {
    extract_directive(source, "Output")
}

/// The text of the `// Error:` comment block of a file, if present.
pub fn extract_error(source: &str) -> Option<String> {
    extract_directive(source, "Error")
}

fn extract_directive(source: &str, name: &str) -> Option<String> {
    let header = format!("// {name}:");
    let mut lines = source.lines();
    lines.by_ref().find(|l| l.trim_end() == header)?;
    let mut out = Vec::new();
    for line in lines {
        let Some(rest) = line.strip_prefix("//") else {
            break;
        };
        let rest = rest.strip_prefix(' ').unwrap_or(rest);
        if rest.ends_with(':') && !rest.contains(' ') && rest.chars().next().is_some_and(|c| c.is_uppercase()) {
            break;
        }
        out.push(rest);
    }
    Some(out.join("\n"))
}

/// Statement contexts that accept extra forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Basic,
    /// A `for` header: `range` clauses are allowed.
    RangeOk,
}

struct Parser<'a> {
    ast: &'a mut Ast,
    file: String,
    tokens: Vec<(Token, Span)>,
    pos: usize,
    prev_end: Pos,
    /// Composite literals of bare type names are not allowed (control
    /// clause headers).
    no_lit: bool,
    block_spans: HashSet<Span>,
}

impl<'a> Parser<'a> {
    fn new(ast: &'a mut Ast, file: &str, tokens: Vec<(Token, Span)>) -> Self {
        Self {
            ast,
            file: file.to_string(),
            tokens,
            pos: 0,
            prev_end: Pos::default(),
            no_lit: false,
            block_spans: HashSet::new(),
        }
    }

    // ---- token helpers ----

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> &Token {
        let i = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[i].0
    }

    fn span(&self) -> Span {
        self.tokens[self.pos.min(self.tokens.len() - 1)].1
    }

    fn start(&self) -> Pos {
        self.span().pos
    }

    fn bump(&mut self) -> Token {
        let (tok, span) = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        self.prev_end = span.end;
        tok
    }

    fn at(&self, tok: &Token) -> bool {
        self.peek() == tok
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.at(tok) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Token) -> Result<()> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("{tok}")))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.bump();
                Ok(name)
            }
            _ => Err(self.unexpected("name")),
        }
    }

    fn unexpected(&self, wanted: &str) -> CompileError {
        let found = match self.peek() {
            Token::Semi => "newline".to_string(),
            t => t.to_string(),
        };
        self.error(format!("syntax error: unexpected {found}, expected {wanted}"))
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::parser(message, self.file.clone(), self.span())
    }

    // ---- node helpers ----

    fn node(&mut self, kind: NodeKind, start: Pos) -> NodeId {
        self.ast.alloc(kind, Span::new(start, self.prev_end))
    }

    fn unique(&mut self, mut span: Span) -> Span {
        while !self.block_spans.insert(span) {
            span.num += 1;
        }
        span
    }

    fn block_node(&mut self, kind: NodeKind, start: Pos) -> NodeId {
        let span = self.unique(Span::new(start, self.prev_end));
        self.ast.alloc(kind, span)
    }

    fn name_node(&mut self, name: String, start: Pos) -> NodeId {
        self.node(NodeKind::Name { name, path: None }, start)
    }

    /// Runs `f` with composite literals of bare names allowed again.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let saved = self.no_lit;
        self.no_lit = false;
        let r = f(self);
        self.no_lit = saved;
        r
    }

    fn with_no_lit<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let saved = self.no_lit;
        self.no_lit = true;
        let r = f(self);
        self.no_lit = saved;
        r
    }

    // ---- file ----

    fn file(&mut self) -> Result<NodeId> {
        let start = self.start();
        self.expect(&Token::Package)?;
        let pkg_name = self.expect_ident()?;
        self.expect_semi()?;
        let mut decls = Vec::new();
        while self.at(&Token::Import) {
            self.import_decl(&mut decls)?;
            self.expect_semi()?;
        }
        while !self.at(&Token::Eof) {
            match self.peek() {
                Token::Func => decls.push(self.func_decl()?),
                Token::Var | Token::Const | Token::Type => self.decl(&mut decls)?,
                Token::Import => return Err(self.error("syntax error: imports must appear before other declarations")),
                _ => return Err(self.unexpected("declaration")),
            }
            if !self.at(&Token::Eof) {
                self.expect_semi()?;
            }
        }
        let kind = NodeKind::File {
            pkg_name,
            name: self.file.clone(),
            decls,
        };
        Ok(self.block_node(kind, start))
    }

    fn expect_semi(&mut self) -> Result<()> {
        if self.eat(&Token::Semi) || self.at(&Token::RParen) || self.at(&Token::RBrace) || self.at(&Token::Eof) {
            Ok(())
        } else {
            Err(self.unexpected("; or newline"))
        }
    }

    fn import_decl(&mut self, out: &mut Vec<NodeId>) -> Result<()> {
        self.expect(&Token::Import)?;
        if self.eat(&Token::LParen) {
            while !self.at(&Token::RParen) {
                out.push(self.import_spec()?);
                self.expect_semi()?;
            }
            self.expect(&Token::RParen)
        } else {
            out.push(self.import_spec()?);
            Ok(())
        }
    }

    fn import_spec(&mut self) -> Result<NodeId> {
        let start = self.start();
        let name = match self.peek().clone() {
            Token::Ident(n) => {
                self.bump();
                Some(n)
            }
            Token::Dot => {
                self.bump();
                Some(".".to_string())
            }
            _ => None,
        };
        let path = match self.bump() {
            Token::Str(s) => crate::values::unquote_string(&s).map_err(|e| self.error(e))?,
            _ => return Err(self.error("syntax error: missing import path")),
        };
        Ok(self.node(NodeKind::Import { name, path }, start))
    }

    // ---- declarations ----

    /// `var`, `const` or `type` declaration, possibly grouped.
    fn decl(&mut self, out: &mut Vec<NodeId>) -> Result<()> {
        let tok = self.bump();
        let grouped = self.eat(&Token::LParen);
        let mut iota = 0i64;
        let mut prev: Option<(Option<NodeId>, Vec<NodeId>)> = None;
        loop {
            if grouped && self.at(&Token::RParen) {
                break;
            }
            let id = match tok {
                Token::Type => self.type_spec()?,
                Token::Const => self.const_spec(iota, &mut prev)?,
                _ => self.var_spec()?,
            };
            out.push(id);
            iota += 1;
            if !grouped {
                break;
            }
            self.expect_semi()?;
        }
        if grouped {
            self.expect(&Token::RParen)?;
        }
        Ok(())
    }

    fn ident_list(&mut self) -> Result<Vec<Ident>> {
        let mut names = vec![Ident::new(self.expect_ident()?)];
        while self.eat(&Token::Comma) {
            names.push(Ident::new(self.expect_ident()?));
        }
        Ok(names)
    }

    fn var_spec(&mut self) -> Result<NodeId> {
        let start = self.start();
        let names = self.ident_list()?;
        let ty = if self.at(&Token::Eq) {
            None
        } else {
            Some(self.parse_type()?)
        };
        let values = if self.eat(&Token::Eq) {
            self.expr_list()?
        } else {
            vec![]
        };
        if ty.is_none() && values.is_empty() {
            return Err(self.unexpected("type"));
        }
        Ok(self.node(
            NodeKind::ValueDecl {
                names,
                ty,
                values,
                is_const: false,
            },
            start,
        ))
    }

    /// A const spec. Within a group, a spec without type and values repeats
    /// the previous one's.
    fn const_spec(&mut self, iota: i64, prev: &mut Option<(Option<NodeId>, Vec<NodeId>)>) -> Result<NodeId> {
        let start = self.start();
        let names = self.ident_list()?;
        let mut ty = None;
        if !self.at(&Token::Eq) && !self.at(&Token::Semi) && !self.at(&Token::RParen) {
            ty = Some(self.parse_type()?);
        }
        let values = if self.eat(&Token::Eq) {
            self.expr_list()?
        } else {
            vec![]
        };
        let (ty, values) = if values.is_empty() {
            if ty.is_some() {
                return Err(self.error("syntax error: missing init expr for const declaration"));
            }
            let Some((pty, pvalues)) = prev.as_ref() else {
                return Err(self.error("syntax error: missing init expr for const declaration"));
            };
            let (pty, pvalues) = (*pty, pvalues.clone());
            let ty = pty.map(|t| self.ast.deep_clone(t));
            let values = pvalues.into_iter().map(|v| self.ast.deep_clone(v)).collect();
            (ty, values)
        } else {
            *prev = Some((ty, values.clone()));
            (ty, values)
        };
        let id = self.node(
            NodeKind::ValueDecl {
                names,
                ty,
                values,
                is_const: true,
            },
            start,
        );
        self.ast.set_attr(id, AttrKey::Iota, AttrValue::Int(iota));
        Ok(id)
    }

    fn type_spec(&mut self) -> Result<NodeId> {
        let start = self.start();
        let name = self.expect_ident()?;
        let is_alias = self.eat(&Token::Eq);
        let ty = self.parse_type()?;
        Ok(self.node(
            NodeKind::TypeDecl {
                name: Ident::new(name),
                ty,
                is_alias,
            },
            start,
        ))
    }

    fn func_decl(&mut self) -> Result<NodeId> {
        let start = self.start();
        self.expect(&Token::Func)?;
        let recv = if self.at(&Token::LParen) {
            let mut fields = self.params()?;
            if fields.len() != 1 {
                return Err(self.error("method has multiple receivers"));
            }
            fields.pop()
        } else {
            None
        };
        let name = self.expect_ident()?;
        let ty = self.signature(start)?;
        let body = if self.at(&Token::LBrace) {
            Some(self.nested(|p| p.block_body())?)
        } else {
            None
        };
        Ok(self.block_node(NodeKind::FuncDecl { recv, name, ty, body }, start))
    }

    // ---- types ----

    fn parse_type(&mut self) -> Result<NodeId> {
        let start = self.start();
        match self.peek().clone() {
            Token::Ident(name) => {
                self.bump();
                let x = self.name_node(name, start);
                if self.at(&Token::Dot) && matches!(self.peek_at(1), Token::Ident(_)) {
                    self.bump();
                    let sel = self.expect_ident()?;
                    return Ok(self.node(NodeKind::Selector { x, sel, path: None }, start));
                }
                Ok(x)
            }
            Token::Star => {
                self.bump();
                let elt = self.parse_type()?;
                Ok(self.node(NodeKind::PointerType { elt }, start))
            }
            Token::LParen => {
                self.bump();
                let t = self.nested(|p| p.parse_type())?;
                self.expect(&Token::RParen)?;
                Ok(t)
            }
            Token::LBracket | Token::Map | Token::Chan | Token::Arrow | Token::Func | Token::Struct | Token::Interface => {
                self.type_literal()
            }
            _ => Err(self.unexpected("type")),
        }
    }

    /// Type literals that can also start an expression.
    fn type_literal(&mut self) -> Result<NodeId> {
        let start = self.start();
        match self.bump() {
            Token::LBracket => {
                if self.eat(&Token::RBracket) {
                    let elt = self.parse_type()?;
                    return Ok(self.node(NodeKind::SliceType { elt, vrd: false }, start));
                }
                let len = if self.eat(&Token::Ellipsis) {
                    None
                } else {
                    Some(self.nested(|p| p.expr())?)
                };
                self.expect(&Token::RBracket)?;
                let elt = self.parse_type()?;
                Ok(self.node(NodeKind::ArrayType { len, elt }, start))
            }
            Token::Map => {
                self.expect(&Token::LBracket)?;
                let key = self.nested(|p| p.parse_type())?;
                self.expect(&Token::RBracket)?;
                let value = self.parse_type()?;
                Ok(self.node(NodeKind::MapType { key, value }, start))
            }
            Token::Chan => {
                let dir = if self.eat(&Token::Arrow) {
                    ChanDir::Send
                } else {
                    ChanDir::Both
                };
                let value = self.parse_type()?;
                Ok(self.node(NodeKind::ChanType { dir, value }, start))
            }
            Token::Arrow => {
                self.expect(&Token::Chan)?;
                let value = self.parse_type()?;
                Ok(self.node(NodeKind::ChanType { dir: ChanDir::Recv, value }, start))
            }
            Token::Func => self.signature(start),
            Token::Struct => self.struct_type(start),
            Token::Interface => self.interface_type(start),
            _ => Err(self.unexpected("type")),
        }
    }

    fn struct_type(&mut self, start: Pos) -> Result<NodeId> {
        self.expect(&Token::LBrace)?;
        let mut fields = Vec::new();
        self.nested(|p| {
            while !p.at(&Token::RBrace) {
                let fstart = p.start();
                let embedded = match p.peek() {
                    Token::Star => true,
                    Token::Ident(_) => matches!(
                        p.peek_at(1),
                        Token::Semi | Token::RBrace | Token::Str(_) | Token::Dot
                    ),
                    _ => false,
                };
                if embedded {
                    let ty = p.parse_type()?;
                    let tag = p.tag()?;
                    fields.push(p.node(NodeKind::Field { name: None, ty, tag }, fstart));
                } else {
                    let names = p.ident_list()?;
                    let ty = p.parse_type()?;
                    let tag = p.tag()?;
                    for (i, n) in names.into_iter().enumerate() {
                        let ty = if i == 0 { ty } else { p.ast.deep_clone(ty) };
                        let field = NodeKind::Field {
                            name: Some(n.name),
                            ty,
                            tag: tag.clone(),
                        };
                        fields.push(p.node(field, fstart));
                    }
                }
                p.expect_semi()?;
            }
            Ok(())
        })?;
        self.expect(&Token::RBrace)?;
        Ok(self.node(NodeKind::StructType { fields }, start))
    }

    fn tag(&mut self) -> Result<Option<String>> {
        match self.peek().clone() {
            Token::Str(s) => {
                self.bump();
                Ok(Some(crate::values::unquote_string(&s).map_err(|e| self.error(e))?))
            }
            _ => Ok(None),
        }
    }

    fn interface_type(&mut self, start: Pos) -> Result<NodeId> {
        self.expect(&Token::LBrace)?;
        let mut methods = Vec::new();
        self.nested(|p| {
            while !p.at(&Token::RBrace) {
                let mstart = p.start();
                if matches!(p.peek(), Token::Ident(_)) && p.peek_at(1) == &Token::LParen {
                    let name = p.expect_ident()?;
                    let ty = p.signature(mstart)?;
                    methods.push(p.node(
                        NodeKind::Field {
                            name: Some(name),
                            ty,
                            tag: None,
                        },
                        mstart,
                    ));
                } else {
                    let ty = p.parse_type()?;
                    methods.push(p.node(NodeKind::Field { name: None, ty, tag: None }, mstart));
                }
                p.expect_semi()?;
            }
            Ok(())
        })?;
        self.expect(&Token::RBrace)?;
        Ok(self.node(NodeKind::InterfaceType { methods }, start))
    }

    /// Parameters and results, after `func` (and the name, for
    /// declarations).
    fn signature(&mut self, start: Pos) -> Result<NodeId> {
        let params = self.params()?;
        let results = match self.peek() {
            Token::LParen => self.params()?,
            Token::Ident(_)
            | Token::Star
            | Token::LBracket
            | Token::Map
            | Token::Chan
            | Token::Func
            | Token::Struct
            | Token::Interface
            | Token::Arrow => {
                let rstart = self.start();
                let ty = self.parse_type()?;
                vec![self.node(NodeKind::Field { name: None, ty, tag: None }, rstart)]
            }
            _ => vec![],
        };
        Ok(self.node(NodeKind::FuncType { params, results }, start))
    }

    /// A parenthesized parameter list. Either every entry is named or none
    /// is; in `a, b int` the names share the type.
    fn params(&mut self) -> Result<Vec<NodeId>> {
        self.expect(&Token::LParen)?;
        let entries = self.nested(|p| {
            let mut entries: Vec<(Pos, Option<String>, Option<NodeId>)> = Vec::new();
            while !p.at(&Token::RParen) {
                let estart = p.start();
                let named = matches!(p.peek(), Token::Ident(_))
                    && !matches!(p.peek_at(1), Token::Comma | Token::RParen | Token::Dot);
                if named {
                    let name = p.expect_ident()?;
                    let ty = p.param_type()?;
                    entries.push((estart, Some(name), Some(ty)));
                } else if let Token::Ident(name) = p.peek().clone()
                    && matches!(p.peek_at(1), Token::Comma | Token::RParen)
                {
                    // a bare name is either a type or a name awaiting its type
                    p.bump();
                    entries.push((estart, Some(name), None));
                } else {
                    let ty = p.param_type()?;
                    entries.push((estart, None, Some(ty)));
                }
                if !p.eat(&Token::Comma) {
                    break;
                }
            }
            Ok(entries)
        })?;
        self.expect(&Token::RParen)?;

        let any_named = entries.iter().any(|(_, n, t)| n.is_some() && t.is_some());
        let mut fields = Vec::with_capacity(entries.len());
        if any_named {
            let mut pending: Vec<(Pos, String)> = Vec::new();
            for (pos, name, ty) in entries {
                match (name, ty) {
                    (Some(n), None) => pending.push((pos, n)),
                    (Some(n), Some(ty)) => {
                        for (ppos, pn) in pending.drain(..) {
                            let copy = self.ast.deep_clone(ty);
                            let f = NodeKind::Field {
                                name: Some(pn),
                                ty: copy,
                                tag: None,
                            };
                            fields.push(self.node(f, ppos));
                        }
                        fields.push(self.node(
                            NodeKind::Field {
                                name: Some(n),
                                ty,
                                tag: None,
                            },
                            pos,
                        ));
                    }
                    (None, _) => return Err(self.error("syntax error: mixed named and unnamed parameters")),
                }
            }
            if !pending.is_empty() {
                return Err(self.error("syntax error: mixed named and unnamed parameters"));
            }
        } else {
            for (pos, name, ty) in entries {
                let ty = match (name, ty) {
                    (_, Some(ty)) => ty,
                    (Some(n), None) => self.ast.alloc(
                        NodeKind::Name { name: n, path: None },
                        Span::new(pos, pos),
                    ),
                    (None, None) => return Err(self.error("syntax error: missing parameter type")),
                };
                fields.push(self.node(NodeKind::Field { name: None, ty, tag: None }, pos));
            }
        }
        Ok(fields)
    }

    fn param_type(&mut self) -> Result<NodeId> {
        let start = self.start();
        if self.eat(&Token::Ellipsis) {
            let elt = self.parse_type()?;
            return Ok(self.node(NodeKind::SliceType { elt, vrd: true }, start));
        }
        self.parse_type()
    }

    // ---- statements ----

    fn block_body(&mut self) -> Result<Vec<NodeId>> {
        self.expect(&Token::LBrace)?;
        let body = self.stmt_list()?;
        self.expect(&Token::RBrace)?;
        Ok(body)
    }

    fn stmt_list(&mut self) -> Result<Vec<NodeId>> {
        let mut body = Vec::new();
        while !matches!(self.peek(), Token::RBrace | Token::Case | Token::Default | Token::Eof) {
            if self.eat(&Token::Semi) {
                continue;
            }
            body.push(self.stmt()?);
            if !matches!(self.peek(), Token::RBrace | Token::Case | Token::Default) {
                self.expect_semi()?;
            }
        }
        Ok(body)
    }

    fn stmt(&mut self) -> Result<NodeId> {
        let start = self.start();
        match self.peek().clone() {
            Token::Ident(label) if self.peek_at(1) == &Token::Colon => {
                self.bump();
                self.bump();
                let stmt = if matches!(self.peek(), Token::RBrace | Token::Semi) {
                    let s = self.node(NodeKind::Empty, start);
                    self.eat(&Token::Semi);
                    s
                } else {
                    self.stmt()?
                };
                self.ast.set_label(stmt, label);
                Ok(stmt)
            }
            Token::Var | Token::Const | Token::Type => {
                let mut body = Vec::new();
                self.decl(&mut body)?;
                Ok(self.node(NodeKind::DeclStmt { body }, start))
            }
            Token::LBrace => {
                let body = self.block_body()?;
                Ok(self.block_node(NodeKind::Block { body }, start))
            }
            Token::If => self.if_stmt(),
            Token::For => self.for_stmt(),
            Token::Switch => self.switch_stmt(),
            Token::Select => self.select_stmt(),
            Token::Return => {
                self.bump();
                let results = if matches!(self.peek(), Token::Semi | Token::RBrace) {
                    vec![]
                } else {
                    self.expr_list()?
                };
                Ok(self.node(NodeKind::Return { results }, start))
            }
            Token::Go | Token::Defer => {
                let tok = self.bump();
                let call = self.expr()?;
                if !matches!(self.ast.kind(call), NodeKind::Call { .. }) {
                    return Err(self.error(format!("syntax error: expression in {tok} must be function call")));
                }
                let kind = if tok == Token::Go {
                    NodeKind::Go { call }
                } else {
                    NodeKind::Defer { call }
                };
                Ok(self.node(kind, start))
            }
            Token::Break | Token::Continue | Token::Goto | Token::Fallthrough => {
                let op = match self.bump() {
                    Token::Break => BranchOp::Break,
                    Token::Continue => BranchOp::Continue,
                    Token::Goto => BranchOp::Goto,
                    _ => BranchOp::Fallthrough,
                };
                let label = match self.peek().clone() {
                    Token::Ident(l) if op != BranchOp::Fallthrough => {
                        self.bump();
                        Some(l)
                    }
                    _ => None,
                };
                if op == BranchOp::Goto && label.is_none() {
                    return Err(self.unexpected("label"));
                }
                let kind = NodeKind::Branch {
                    op,
                    label,
                    target: None,
                    depth: 0,
                    frame_depth: 0,
                    body_index: -1,
                };
                Ok(self.node(kind, start))
            }
            Token::Semi => Ok(self.node(NodeKind::Empty, start)),
            _ => self.simple_stmt(Mode::Basic),
        }
    }

    fn simple_stmt(&mut self, mode: Mode) -> Result<NodeId> {
        let start = self.start();
        if mode == Mode::RangeOk && self.eat(&Token::Range) {
            let x = self.expr()?;
            return Ok(self.range_node(x, None, None, false, start));
        }
        let lhs = self.expr_list()?;
        let assign_op = match self.peek() {
            Token::Eq => Some(AssignOp::Assign),
            Token::Define => Some(AssignOp::Define),
            Token::PlusEq => Some(AssignOp::Op(BinaryOp::Add)),
            Token::MinusEq => Some(AssignOp::Op(BinaryOp::Sub)),
            Token::StarEq => Some(AssignOp::Op(BinaryOp::Mul)),
            Token::SlashEq => Some(AssignOp::Op(BinaryOp::Quo)),
            Token::PercentEq => Some(AssignOp::Op(BinaryOp::Rem)),
            Token::AmpEq => Some(AssignOp::Op(BinaryOp::And)),
            Token::PipeEq => Some(AssignOp::Op(BinaryOp::Or)),
            Token::CaretEq => Some(AssignOp::Op(BinaryOp::Xor)),
            Token::ShlEq => Some(AssignOp::Op(BinaryOp::Shl)),
            Token::ShrEq => Some(AssignOp::Op(BinaryOp::Shr)),
            Token::AndNotEq => Some(AssignOp::Op(BinaryOp::AndNot)),
            _ => None,
        };
        if let Some(op) = assign_op {
            self.bump();
            let plain = matches!(op, AssignOp::Assign | AssignOp::Define);
            if plain && mode == Mode::RangeOk && self.eat(&Token::Range) {
                if lhs.len() > 2 {
                    return Err(self.error("syntax error: range clause permits at most two iteration variables"));
                }
                let x = self.expr()?;
                let define = op == AssignOp::Define;
                return Ok(self.range_node(x, lhs.first().copied(), lhs.get(1).copied(), define, start));
            }
            let rhs = self.expr_list()?;
            if let AssignOp::Op(_) = op
                && (lhs.len() != 1 || rhs.len() != 1)
            {
                return Err(self.error(format!("syntax error: assignment operation {op} requires single-valued expressions")));
            }
            return Ok(self.node(NodeKind::Assign { lhs, op, rhs }, start));
        }
        if lhs.len() > 1 {
            return Err(self.unexpected(":= or = or comma"));
        }
        let x = lhs[0];
        match self.peek() {
            Token::Inc | Token::Dec => {
                let op = if self.bump() == Token::Inc {
                    IncDecOp::Inc
                } else {
                    IncDecOp::Dec
                };
                Ok(self.node(NodeKind::IncDec { x, op }, start))
            }
            Token::Arrow => {
                self.bump();
                let value = self.expr()?;
                Ok(self.node(NodeKind::Send { chan: x, value }, start))
            }
            _ => Ok(self.node(NodeKind::ExprStmt { x }, start)),
        }
    }

    fn range_node(&mut self, x: NodeId, key: Option<NodeId>, value: Option<NodeId>, define: bool, start: Pos) -> NodeId {
        self.node(
            NodeKind::Range {
                x,
                key,
                value,
                define,
                body: vec![],
            },
            start,
        )
    }

    fn if_stmt(&mut self) -> Result<NodeId> {
        let start = self.start();
        self.expect(&Token::If)?;
        let (init, cond) = self.with_no_lit(|p| {
            if p.at(&Token::LBrace) {
                return Err(p.error("syntax error: missing condition in if statement"));
            }
            let s = if p.at(&Token::Semi) { None } else { Some(p.simple_stmt(Mode::Basic)?) };
            if p.eat(&Token::Semi) {
                let cond = p.expr()?;
                Ok((s, cond))
            } else {
                let s = s.ok_or_else(|| p.error("syntax error: missing condition in if statement"))?;
                Ok((None, p.stmt_expr(s, "if")?))
            }
        })?;
        let then_start = self.start();
        let body = self.nested(|p| p.block_body())?;
        let then = self.block_node(NodeKind::IfCase { body }, then_start);
        let els = if self.eat(&Token::Else) {
            let else_start = self.start();
            match self.peek() {
                Token::If => {
                    let nested = self.if_stmt()?;
                    self.block_node(NodeKind::IfCase { body: vec![nested] }, else_start)
                }
                Token::LBrace => {
                    let body = self.nested(|p| p.block_body())?;
                    self.block_node(NodeKind::IfCase { body }, else_start)
                }
                _ => return Err(self.unexpected("if statement or block")),
            }
        } else {
            let end = self.prev_end;
            let span = self.unique(Span::new(end, end));
            self.ast.alloc(NodeKind::IfCase { body: vec![] }, span)
        };
        Ok(self.block_node(NodeKind::If { init, cond, then, els }, start))
    }

    /// The expression of an expression statement used as a condition.
    fn stmt_expr(&mut self, s: NodeId, what: &str) -> Result<NodeId> {
        match self.ast.kind(s) {
            NodeKind::ExprStmt { x } => Ok(*x),
            _ => Err(self.error(format!("syntax error: cannot use statement as value in {what}"))),
        }
    }

    fn for_stmt(&mut self) -> Result<NodeId> {
        let start = self.start();
        self.expect(&Token::For)?;
        let header = self.with_no_lit(|p| {
            if p.at(&Token::LBrace) {
                return Ok((None, None, None, None));
            }
            let s1 = if p.at(&Token::Semi) {
                None
            } else {
                Some(p.simple_stmt(Mode::RangeOk)?)
            };
            if let Some(s) = s1
                && matches!(p.ast.kind(s), NodeKind::Range { .. })
            {
                return Ok((None, None, None, Some(s)));
            }
            if p.eat(&Token::Semi) {
                let cond = if p.at(&Token::Semi) { None } else { Some(p.expr()?) };
                p.expect(&Token::Semi)?;
                let post = if p.at(&Token::LBrace) {
                    None
                } else {
                    Some(p.simple_stmt(Mode::Basic)?)
                };
                Ok((s1, cond, post, None))
            } else {
                let cond = match s1 {
                    Some(s) => Some(p.stmt_expr(s, "for")?),
                    None => None,
                };
                Ok((None, cond, None, None))
            }
        })?;
        let body = self.nested(|p| p.block_body())?;
        let (init, cond, post, range) = header;
        if let Some(r) = range {
            if let NodeKind::Range { body: rbody, .. } = self.ast.kind_mut(r) {
                *rbody = body;
            }
            let span = self.unique(Span::new(start, self.prev_end));
            self.ast.force_span(r, span);
            return Ok(r);
        }
        Ok(self.block_node(NodeKind::For { init, cond, post, body }, start))
    }

    fn switch_stmt(&mut self) -> Result<NodeId> {
        let start = self.start();
        self.expect(&Token::Switch)?;
        let (init, tag) = self.with_no_lit(|p| {
            if p.at(&Token::LBrace) {
                return Ok((None, None));
            }
            let s1 = if p.at(&Token::Semi) {
                None
            } else {
                Some(p.simple_stmt(Mode::Basic)?)
            };
            if p.eat(&Token::Semi) {
                let s2 = if p.at(&Token::LBrace) {
                    None
                } else {
                    Some(p.simple_stmt(Mode::Basic)?)
                };
                Ok((s1, s2))
            } else {
                Ok((None, s1))
            }
        })?;
        let (x, is_type_switch, var_name) = match tag {
            None => (None, false, None),
            Some(s) => self.switch_tag(s)?,
        };
        self.expect(&Token::LBrace)?;
        let mut clauses = Vec::new();
        self.nested(|p| {
            while !p.at(&Token::RBrace) {
                let cstart = p.start();
                let cases = if p.eat(&Token::Default) {
                    vec![]
                } else {
                    p.expect(&Token::Case)?;
                    p.expr_list()?
                };
                p.expect(&Token::Colon)?;
                let body = p.stmt_list()?;
                clauses.push(p.block_node(NodeKind::SwitchClause { cases, body }, cstart));
            }
            Ok(())
        })?;
        self.expect(&Token::RBrace)?;
        let defaults = clauses
            .iter()
            .filter(|c| matches!(self.ast.kind(**c), NodeKind::SwitchClause { cases, .. } if cases.is_empty()))
            .count();
        if defaults > 1 {
            return Err(self.error("multiple defaults in switch"));
        }
        let kind = NodeKind::Switch {
            init,
            x,
            is_type_switch,
            var_name,
            clauses,
        };
        Ok(self.block_node(kind, start))
    }

    /// Splits a switch tag statement into the switched expression, the
    /// type-switch flag and the bound variable name.
    fn switch_tag(&mut self, s: NodeId) -> Result<(Option<NodeId>, bool, Option<String>)> {
        let guard = |ast: &Ast, x: NodeId| match ast.kind(x) {
            NodeKind::TypeAssert { x, ty: None, .. } => Some(*x),
            _ => None,
        };
        match self.ast.kind(s).clone() {
            NodeKind::ExprStmt { x } => match guard(&*self.ast, x) {
                Some(inner) => Ok((Some(inner), true, None)),
                None => Ok((Some(x), false, None)),
            },
            NodeKind::Assign {
                lhs,
                op: AssignOp::Define,
                rhs,
            } if lhs.len() == 1 && rhs.len() == 1 => {
                let Some(inner) = guard(&*self.ast, rhs[0]) else {
                    return Err(self.error("syntax error: switch expression must be a type switch guard"));
                };
                let name = match self.ast.kind(lhs[0]) {
                    NodeKind::Name { name, .. } => name.clone(),
                    _ => return Err(self.error("syntax error: invalid variable name in type switch")),
                };
                Ok((Some(inner), true, Some(name)))
            }
            _ => Err(self.error("syntax error: switch expression must be an expression")),
        }
    }

    fn select_stmt(&mut self) -> Result<NodeId> {
        let start = self.start();
        self.expect(&Token::Select)?;
        self.expect(&Token::LBrace)?;
        let mut cases = Vec::new();
        while !self.at(&Token::RBrace) {
            let cstart = self.start();
            let comm = if self.eat(&Token::Default) {
                None
            } else {
                self.expect(&Token::Case)?;
                Some(self.simple_stmt(Mode::Basic)?)
            };
            self.expect(&Token::Colon)?;
            let body = self.stmt_list()?;
            cases.push(self.block_node(NodeKind::SelectCase { comm, body }, cstart));
        }
        self.expect(&Token::RBrace)?;
        Ok(self.node(NodeKind::Select { cases }, start))
    }

    // ---- expressions ----

    fn expr_list(&mut self) -> Result<Vec<NodeId>> {
        let mut list = vec![self.expr()?];
        while self.eat(&Token::Comma) {
            list.push(self.expr()?);
        }
        Ok(list)
    }

    fn expr(&mut self) -> Result<NodeId> {
        stacker::maybe_grow(32 * 1024, 1024 * 1024, || self.binary_expr(1))
    }

    fn binary_op(&self) -> Option<BinaryOp> {
        Some(match self.peek() {
            Token::OrOr => BinaryOp::LOr,
            Token::AndAnd => BinaryOp::LAnd,
            Token::EqEq => BinaryOp::Eql,
            Token::NotEq => BinaryOp::Neq,
            Token::Lt => BinaryOp::Lss,
            Token::LtEq => BinaryOp::Leq,
            Token::Gt => BinaryOp::Gtr,
            Token::GtEq => BinaryOp::Geq,
            Token::Plus => BinaryOp::Add,
            Token::Minus => BinaryOp::Sub,
            Token::Pipe => BinaryOp::Or,
            Token::Caret => BinaryOp::Xor,
            Token::Star => BinaryOp::Mul,
            Token::Slash => BinaryOp::Quo,
            Token::Percent => BinaryOp::Rem,
            Token::Shl => BinaryOp::Shl,
            Token::Shr => BinaryOp::Shr,
            Token::Amp => BinaryOp::And,
            Token::AndNot => BinaryOp::AndNot,
            _ => return None,
        })
    }

    fn binary_expr(&mut self, min_prec: u8) -> Result<NodeId> {
        let start = self.start();
        let mut left = self.unary_expr()?;
        while let Some(op) = self.binary_op() {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.bump();
            let right = self.binary_expr(prec + 1)?;
            left = self.node(NodeKind::Binary { op, left, right }, start);
        }
        Ok(left)
    }

    fn unary_expr(&mut self) -> Result<NodeId> {
        let start = self.start();
        let op = match self.peek() {
            Token::Plus => UnaryOp::Pos,
            Token::Minus => UnaryOp::Neg,
            Token::Bang => UnaryOp::Not,
            Token::Caret => UnaryOp::Xor,
            Token::Star => {
                self.bump();
                let x = self.unary_expr()?;
                return Ok(self.node(NodeKind::Star { x }, start));
            }
            Token::Amp => {
                self.bump();
                let x = self.unary_expr()?;
                return Ok(self.node(NodeKind::Ref { x }, start));
            }
            Token::Arrow if self.peek_at(1) == &Token::Chan => return self.primary_expr(),
            Token::Arrow => UnaryOp::Recv,
            _ => return self.primary_expr(),
        };
        self.bump();
        let x = self.unary_expr()?;
        Ok(self.node(NodeKind::Unary { op, x }, start))
    }

    fn operand(&mut self) -> Result<NodeId> {
        let start = self.start();
        match self.peek().clone() {
            Token::Ident(name) => {
                self.bump();
                Ok(self.name_node(name, start))
            }
            Token::Int(text) => self.basic_lit(LitKind::Int, text, start),
            Token::Float(text) => self.basic_lit(LitKind::Float, text, start),
            Token::Char(text) => self.basic_lit(LitKind::Char, text, start),
            Token::Str(text) => self.basic_lit(LitKind::String, text, start),
            Token::LParen => {
                self.bump();
                let x = self.nested(|p| p.expr())?;
                self.expect(&Token::RParen)?;
                Ok(x)
            }
            Token::Func => {
                self.bump();
                let ty = self.signature(start)?;
                if self.at(&Token::LBrace) {
                    let body = self.nested(|p| p.block_body())?;
                    let kind = NodeKind::FuncLit {
                        ty,
                        body,
                        captures: vec![],
                    };
                    return Ok(self.block_node(kind, start));
                }
                Ok(ty)
            }
            Token::LBracket | Token::Map | Token::Chan | Token::Struct | Token::Interface | Token::Arrow => {
                self.type_literal()
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn basic_lit(&mut self, kind: LitKind, value: String, start: Pos) -> Result<NodeId> {
        self.bump();
        Ok(self.node(NodeKind::BasicLit { kind, value }, start))
    }

    fn primary_expr(&mut self) -> Result<NodeId> {
        let start = self.start();
        let mut x = self.operand()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.bump();
                    if self.eat(&Token::LParen) {
                        let ty = if self.eat(&Token::Type) {
                            None
                        } else {
                            Some(self.nested(|p| p.parse_type())?)
                        };
                        self.expect(&Token::RParen)?;
                        x = self.node(NodeKind::TypeAssert { x, ty, has_ok: false }, start);
                    } else {
                        let sel = self.expect_ident()?;
                        x = self.node(NodeKind::Selector { x, sel, path: None }, start);
                    }
                }
                Token::LBracket => {
                    self.bump();
                    x = self.nested(|p| p.index_or_slice(x, start))?;
                }
                Token::LParen => {
                    self.bump();
                    let (args, varg) = self.nested(|p| {
                        let mut args = Vec::new();
                        let mut varg = false;
                        while !p.at(&Token::RParen) {
                            args.push(p.expr()?);
                            if p.eat(&Token::Ellipsis) {
                                varg = true;
                            }
                            if !p.eat(&Token::Comma) {
                                break;
                            }
                        }
                        Ok((args, varg))
                    })?;
                    self.expect(&Token::RParen)?;
                    let kind = NodeKind::Call {
                        func: x,
                        args,
                        varg,
                        num_args: 0,
                    };
                    x = self.node(kind, start);
                }
                Token::LBrace if self.is_literal_type(x) => {
                    x = self.composite_lit(Some(x), start)?;
                }
                _ => return Ok(x),
            }
        }
    }

    fn is_literal_type(&self, x: NodeId) -> bool {
        match self.ast.kind(x) {
            NodeKind::Name { .. } => !self.no_lit,
            NodeKind::Selector { x, .. } => !self.no_lit && matches!(self.ast.kind(*x), NodeKind::Name { .. }),
            NodeKind::ArrayType { .. } | NodeKind::SliceType { .. } | NodeKind::MapType { .. } | NodeKind::StructType { .. } => {
                true
            }
            _ => false,
        }
    }

    fn index_or_slice(&mut self, x: NodeId, start: Pos) -> Result<NodeId> {
        let low = if self.at(&Token::Colon) { None } else { Some(self.expr()?) };
        if self.eat(&Token::RBracket) {
            let index = low.ok_or_else(|| self.error("syntax error: expected operand"))?;
            return Ok(self.node(
                NodeKind::Index {
                    x,
                    index,
                    has_ok: false,
                },
                start,
            ));
        }
        self.expect(&Token::Colon)?;
        let high = if matches!(self.peek(), Token::Colon | Token::RBracket) {
            None
        } else {
            Some(self.expr()?)
        };
        let max = if self.eat(&Token::Colon) {
            if high.is_none() {
                return Err(self.error("syntax error: middle index required in 3-index slice"));
            }
            Some(self.expr()?)
        } else {
            None
        };
        self.expect(&Token::RBracket)?;
        Ok(self.node(NodeKind::Slice { x, low, high, max }, start))
    }

    fn composite_lit(&mut self, ty: Option<NodeId>, start: Pos) -> Result<NodeId> {
        self.expect(&Token::LBrace)?;
        let elts = self.nested(|p| {
            let mut elts = Vec::new();
            while !p.at(&Token::RBrace) {
                let estart = p.start();
                let first = p.element()?;
                let elt = if p.eat(&Token::Colon) {
                    let value = p.element()?;
                    p.node(NodeKind::KeyValue { key: Some(first), value }, estart)
                } else {
                    p.node(NodeKind::KeyValue { key: None, value: first }, estart)
                };
                elts.push(elt);
                if !p.eat(&Token::Comma) {
                    // a newline before the closing brace needs a comma
                    if p.at(&Token::Semi) {
                        return Err(p.unexpected("comma or }"));
                    }
                    break;
                }
            }
            Ok(elts)
        })?;
        self.expect(&Token::RBrace)?;
        Ok(self.node(NodeKind::CompositeLit { ty, elts }, start))
    }

    fn element(&mut self) -> Result<NodeId> {
        if self.at(&Token::LBrace) {
            let start = self.start();
            return self.composite_lit(None, start);
        }
        self.expr()
    }
}
