//! Statement parsing.
use smol_str::SmolStr;

use super::{consume_ident, is_keyword, span_from, unexpected, Parse, ParseResult};
use crate::{
    ast::{ClassDecl, EnumDecl, EnumItem, Expr, FnDecl, Stmt, Type, TypeKind, VarDesc},
    chunk::VarArg,
    error::{Diagnostic, DiagnosticKind},
    lex::{Keyword, TokenKind, TokenStream},
};

impl Parse for Stmt {
    fn parse(input: &mut TokenStream) -> ParseResult<Self> {
        input.nested(parse_stmt)
    }
}

fn parse_stmt(input: &mut TokenStream) -> ParseResult<Stmt> {
    use Keyword as K;
    use TokenKind as T;

    match input.peek_kind() {
        T::Keyword(K::Let | K::Const) => parse_let(input),
        T::Keyword(K::Fn) if input.peek_nth(1).kind == T::Ident => {
            FnDecl::parse(input).map(|decl| Stmt::Function(Box::new(decl)))
        }
        T::Keyword(K::Class) => ClassDecl::parse(input).map(|decl| Stmt::Class(Box::new(decl))),
        T::Keyword(K::Enum) => EnumDecl::parse(input).map(Stmt::Enum),
        T::Keyword(K::Module) => parse_module(input),
        T::Keyword(K::Return) => parse_return(input),
        T::Keyword(K::If) => parse_if(input),
        T::Keyword(K::While) => parse_while(input),
        T::Keyword(K::Break) => {
            let token = input.next_token();
            input.consume(T::Semicolon)?;
            Ok(Stmt::Break(token.span))
        }
        T::Keyword(K::Continue) => {
            let token = input.next_token();
            input.consume(T::Semicolon)?;
            Ok(Stmt::Continue(token.span))
        }
        T::LeftBrace => {
            let start = input.peek().span;
            let body = parse_block(input)?;
            Ok(Stmt::Scope {
                body,
                span: span_from(input, start),
            })
        }
        _ => {
            let expr = Expr::parse(input)?;
            // Statement must be terminated with a semicolon.
            input.consume(T::Semicolon)?;
            Ok(Stmt::Expr(expr))
        }
    }
}

/// `{ stmt* }`
pub(super) fn parse_block(input: &mut TokenStream) -> ParseResult<Vec<Stmt>> {
    input.consume(TokenKind::LeftBrace)?;
    let mut body = Vec::new();
    while input.peek_kind() != TokenKind::RightBrace && !input.at_end() {
        body.push(Stmt::parse(input)?);
    }
    input.consume(TokenKind::RightBrace)?;
    Ok(body)
}

/// `("let" | "const") vardesc ("=" expr)? ";"`
fn parse_let(input: &mut TokenStream) -> ParseResult<Stmt> {
    let keyword = input.next_token();
    let constant = is_keyword(&keyword, Keyword::Const);
    let desc = VarDesc::parse(input)?;

    let value = if input.match_token(TokenKind::Eq) {
        Some(Expr::parse(input)?)
    } else {
        None
    };
    input.consume(TokenKind::Semicolon)?;

    Ok(Stmt::Let {
        desc,
        value,
        constant,
        span: span_from(input, keyword.span),
    })
}

fn parse_module(input: &mut TokenStream) -> ParseResult<Stmt> {
    let keyword = input.next_token();
    let name = consume_ident(input)?;
    let body = parse_block(input)?;
    Ok(Stmt::Module {
        name: SmolStr::new(input.span_fragment(&name.span)),
        body,
        span: span_from(input, keyword.span),
    })
}

/// `"return" (expr ("," expr)*)? ";"`
fn parse_return(input: &mut TokenStream) -> ParseResult<Stmt> {
    let keyword = input.next_token();
    let mut values = Vec::new();

    if input.peek_kind() != TokenKind::Semicolon {
        values.push(Expr::parse(input)?);
        while input.match_token(TokenKind::Comma) {
            values.push(Expr::parse(input)?);
        }
    }
    input.consume(TokenKind::Semicolon)?;

    let span = span_from(input, keyword.span);
    let value = match values.len() {
        0 => None,
        1 => values.pop(),
        _ => {
            let values_span = values[0].span().merge(&values[values.len() - 1].span());
            Some(Expr::Aggregate(values, values_span))
        }
    };
    Ok(Stmt::Return { value, span })
}

fn parse_if(input: &mut TokenStream) -> ParseResult<Stmt> {
    let keyword = input.next_token();
    input.consume(TokenKind::LeftParen)?;
    let cond = Expr::parse(input)?;
    input.consume(TokenKind::RightParen)?;
    let then = Box::new(Stmt::parse(input)?);

    let otherwise = if input.match_token(TokenKind::Keyword(Keyword::Else)) {
        Some(Box::new(Stmt::parse(input)?))
    } else {
        None
    };

    Ok(Stmt::If {
        cond,
        then,
        otherwise,
        span: span_from(input, keyword.span),
    })
}

fn parse_while(input: &mut TokenStream) -> ParseResult<Stmt> {
    let keyword = input.next_token();
    input.consume(TokenKind::LeftParen)?;
    let cond = Expr::parse(input)?;
    input.consume(TokenKind::RightParen)?;
    let body = Box::new(Stmt::parse(input)?);

    Ok(Stmt::While {
        cond,
        body,
        span: span_from(input, keyword.span),
    })
}

/// `IDENT (":" type)?`
impl Parse for VarDesc {
    fn parse(input: &mut TokenStream) -> ParseResult<Self> {
        let name = consume_ident(input)?;
        let ty = if input.match_token(TokenKind::Colon) {
            Some(Type::parse(input)?)
        } else {
            None
        };
        Ok(VarDesc {
            name: SmolStr::new(input.span_fragment(&name.span)),
            ty,
            span: span_from(input, name.span),
        })
    }
}

impl Parse for Type {
    fn parse(input: &mut TokenStream) -> ParseResult<Self> {
        let token = input.peek().clone();
        if !matches!(token.kind, TokenKind::Ident) {
            return Err(unexpected(&token, "type name"));
        }
        input.next_token();

        let text = input.span_fragment(&token.span);
        Ok(match TypeKind::parse(text) {
            Some(kind) => Type {
                kind,
                name: None,
                span: token.span,
            },
            // Resolved to a class or struct by the type checker.
            None => Type {
                kind: TypeKind::Class,
                name: Some(SmolStr::new(text)),
                span: token.span,
            },
        })
    }
}

/// `"fn" IDENT "(" params ")" (":" type)? "{" stmt* "}"`
impl Parse for FnDecl {
    fn parse(input: &mut TokenStream) -> ParseResult<Self> {
        let keyword = input.consume(TokenKind::Keyword(Keyword::Fn))?;
        let name = consume_ident(input)?;
        let name = SmolStr::new(input.span_fragment(&name.span));
        parse_fn_rest(input, name, keyword.span)
    }
}

/// Parameters, return type and body, after the function's name.
pub(super) fn parse_fn_rest(
    input: &mut TokenStream,
    name: SmolStr,
    start: crate::lex::Span,
) -> ParseResult<FnDecl> {
    input.consume(TokenKind::LeftParen)?;

    let mut params = Vec::new();
    let mut varargs = VarArg::None;
    let mut rest = None;

    while input.peek_kind() != TokenKind::RightParen {
        if varargs.is_variadic() {
            return Err(Diagnostic::error(
                DiagnosticKind::Syntax,
                input.peek().span,
                "rest parameter must be the last parameter",
            ));
        }

        if input.match_token(TokenKind::Ellipsis) {
            varargs = VarArg::Unnamed;
        } else if input.peek_kind() == TokenKind::Ident
            && input.peek_nth(1).kind == TokenKind::Ellipsis
        {
            let token = input.next_token();
            input.next_token();
            varargs = VarArg::Named;
            rest = Some(SmolStr::new(input.span_fragment(&token.span)));
        } else {
            params.push(VarDesc::parse(input)?);
        }

        if !input.match_token(TokenKind::Comma) {
            break;
        }
    }
    input.consume(TokenKind::RightParen)?;

    let ret = if input.match_token(TokenKind::Colon) {
        Some(Type::parse(input)?)
    } else {
        None
    };

    let body = parse_block(input)?;

    Ok(FnDecl {
        name,
        params,
        varargs,
        rest,
        ret,
        body,
        span: span_from(input, start),
    })
}

/// `"class" IDENT (":" IDENT ("," IDENT)*)? "{" (let | fn | enum)* "}"`
impl Parse for ClassDecl {
    fn parse(input: &mut TokenStream) -> ParseResult<Self> {
        use Keyword as K;

        let keyword = input.consume(TokenKind::Keyword(K::Class))?;
        let name = consume_ident(input)?;
        let name = SmolStr::new(input.span_fragment(&name.span));

        let mut parents = Vec::new();
        if input.match_token(TokenKind::Colon) {
            loop {
                let parent = consume_ident(input)?;
                parents.push((SmolStr::new(input.span_fragment(&parent.span)), parent.span));
                if !input.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }

        input.consume(TokenKind::LeftBrace)?;
        let mut members = Vec::new();
        while input.peek_kind() != TokenKind::RightBrace && !input.at_end() {
            let member = match input.peek_kind() {
                TokenKind::Keyword(K::Let | K::Const) => parse_let(input)?,
                TokenKind::Keyword(K::Fn) => Stmt::Function(Box::new(FnDecl::parse(input)?)),
                TokenKind::Keyword(K::Enum) => Stmt::Enum(EnumDecl::parse(input)?),
                _ => return Err(unexpected(input.peek(), "class member")),
            };
            members.push(member);
        }
        input.consume(TokenKind::RightBrace)?;

        Ok(ClassDecl {
            name,
            parents,
            members,
            span: span_from(input, keyword.span),
        })
    }
}

/// `"enum" IDENT "{" (IDENT ("=" expr)? ","?)* "}"`
impl Parse for EnumDecl {
    fn parse(input: &mut TokenStream) -> ParseResult<Self> {
        let keyword = input.consume(TokenKind::Keyword(Keyword::Enum))?;
        let name = consume_ident(input)?;
        let name = SmolStr::new(input.span_fragment(&name.span));

        input.consume(TokenKind::LeftBrace)?;
        let mut items = Vec::new();
        while input.peek_kind() != TokenKind::RightBrace && !input.at_end() {
            let item = consume_ident(input)?;
            let value = if input.match_token(TokenKind::Eq) {
                Some(Expr::parse(input)?)
            } else {
                None
            };
            items.push(EnumItem {
                name: SmolStr::new(input.span_fragment(&item.span)),
                value,
                span: span_from(input, item.span),
            });
            input.match_token(TokenKind::Comma);
        }
        input.consume(TokenKind::RightBrace)?;

        Ok(EnumDecl {
            name,
            items,
            span: span_from(input, keyword.span),
        })
    }
}
