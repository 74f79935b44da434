//! Expression construction helpers.
//!
//! Used by rewrite passes for synthesized nodes and by tests for input
//! trees. Each helper returns an [`Expression`] so results compose directly.

use crate::ast::{
    ClassDef, ClassKind, Expression, IdentScope, InsSeq, Literal, LiteralValue, Local, MethodDef,
    MethodFlags, Send, UnresolvedIdent,
};
use crate::{names, Loc, Name};

pub fn empty(loc: Loc) -> Expression {
    Expression::Empty(loc)
}

pub fn class_def(
    loc: Loc,
    name: Expression,
    ancestors: Vec<Expression>,
    rhs: Vec<Expression>,
) -> Expression {
    Expression::ClassDef(ClassDef {
        loc,
        kind: ClassKind::Class,
        name: Box::new(name),
        ancestors,
        rhs,
    })
}

pub fn module_def(loc: Loc, name: Expression, rhs: Vec<Expression>) -> Expression {
    Expression::ClassDef(ClassDef {
        loc,
        kind: ClassKind::Module,
        name: Box::new(name),
        ancestors: vec![],
        rhs,
    })
}

/// The synthesized `class << self` wrapper around `rhs`.
pub fn singleton_class(loc: Loc, rhs: Vec<Expression>) -> Expression {
    Expression::ClassDef(ClassDef {
        loc,
        kind: ClassKind::Class,
        name: Box::new(constant(Loc::NONE, names::SINGLETON)),
        ancestors: vec![],
        rhs,
    })
}

pub fn method_def(
    loc: Loc,
    name: Name,
    is_self: bool,
    params: Vec<Expression>,
    rhs: Expression,
) -> Expression {
    Expression::MethodDef(MethodDef {
        loc,
        name,
        flags: MethodFlags {
            is_self,
            ..MethodFlags::default()
        },
        params,
        rhs: Box::new(rhs),
    })
}

pub fn send(loc: Loc, recv: Expression, method: Name, args: Vec<Expression>) -> Expression {
    Expression::Send(Send {
        loc,
        recv: Box::new(recv),
        method,
        args,
    })
}

/// An implicit-self call with no arguments.
pub fn send0(loc: Loc, method: Name) -> Expression {
    send(loc, empty(Loc::NONE), method, vec![])
}

/// An implicit-self call with one argument.
pub fn send1(loc: Loc, method: Name, arg: Expression) -> Expression {
    send(loc, empty(Loc::NONE), method, vec![arg])
}

pub fn ins_seq(loc: Loc, stats: Vec<Expression>, result: Expression) -> Expression {
    Expression::InsSeq(InsSeq {
        loc,
        stats,
        result: Box::new(result),
    })
}

pub fn local(loc: Loc, name: Name) -> Expression {
    Expression::Local(Local { loc, name })
}

/// A constant reference (class-scope unresolved identifier).
pub fn constant(loc: Loc, name: Name) -> Expression {
    Expression::UnresolvedIdent(UnresolvedIdent {
        loc,
        scope: IdentScope::Class,
        name,
    })
}

pub fn nil(loc: Loc) -> Expression {
    Expression::Literal(Literal {
        loc,
        value: LiteralValue::Nil,
    })
}

pub fn int(loc: Loc, value: i64) -> Expression {
    Expression::Literal(Literal {
        loc,
        value: LiteralValue::Int(value),
    })
}

pub fn sym(loc: Loc, name: Name) -> Expression {
    Expression::Literal(Literal {
        loc,
        value: LiteralValue::Sym(name),
    })
}

pub fn str(loc: Loc, name: Name) -> Expression {
    Expression::Literal(Literal {
        loc,
        value: LiteralValue::Str(name),
    })
}
