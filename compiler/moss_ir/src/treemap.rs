//! Transforming tree walker.
//!
//! [`map_expression`] drives a [`TreeMapper`] over an owned expression tree:
//! for each node it calls the matching `pre_*` hook, recurses into the owned
//! children (substituting whatever they map to), then calls the `post_*`
//! hook. Pre hooks run parent-before-children and may mutate the node in
//! place; post hooks run children-before-parent, take the node by value, and
//! may return *any* expression — returning `Empty` deletes the node from its
//! parent's child slot. Children are visited in source order.
//!
//! Hooks exist only for the node kinds a rewrite pass can act on; leaves
//! (`Empty`, `Local`, `UnresolvedIdent`, `Literal`) pass through untouched.

use crate::ast::{ClassDef, Expression, InsSeq, MethodDef, Send};

/// Visitor over an owned tree. Override the hooks you need; defaults are
/// identity.
pub trait TreeMapper {
    fn pre_class_def(&mut self, class_def: &mut ClassDef) {
        let _ = class_def;
    }

    fn post_class_def(&mut self, class_def: ClassDef) -> Expression {
        Expression::ClassDef(class_def)
    }

    fn pre_method_def(&mut self, method_def: &mut MethodDef) {
        let _ = method_def;
    }

    fn post_method_def(&mut self, method_def: MethodDef) -> Expression {
        Expression::MethodDef(method_def)
    }

    fn pre_send(&mut self, send: &mut Send) {
        let _ = send;
    }

    fn post_send(&mut self, send: Send) -> Expression {
        Expression::Send(send)
    }

    fn pre_ins_seq(&mut self, seq: &mut InsSeq) {
        let _ = seq;
    }

    fn post_ins_seq(&mut self, seq: InsSeq) -> Expression {
        Expression::InsSeq(seq)
    }
}

/// Map `mapper` over `expr`, returning the rewritten tree.
pub fn map_expression<M: TreeMapper + ?Sized>(mapper: &mut M, expr: Expression) -> Expression {
    match expr {
        Expression::ClassDef(mut class_def) => {
            mapper.pre_class_def(&mut class_def);
            class_def.name = Box::new(map_expression(mapper, *class_def.name));
            class_def.ancestors = map_children(mapper, class_def.ancestors);
            class_def.rhs = map_children(mapper, class_def.rhs);
            mapper.post_class_def(class_def)
        }
        Expression::MethodDef(mut method_def) => {
            mapper.pre_method_def(&mut method_def);
            method_def.params = map_children(mapper, method_def.params);
            method_def.rhs = Box::new(map_expression(mapper, *method_def.rhs));
            mapper.post_method_def(method_def)
        }
        Expression::Send(mut send) => {
            mapper.pre_send(&mut send);
            send.recv = Box::new(map_expression(mapper, *send.recv));
            send.args = map_children(mapper, send.args);
            mapper.post_send(send)
        }
        Expression::InsSeq(mut seq) => {
            mapper.pre_ins_seq(&mut seq);
            seq.stats = map_children(mapper, seq.stats);
            seq.result = Box::new(map_expression(mapper, *seq.result));
            mapper.post_ins_seq(seq)
        }
        leaf @ (Expression::Empty(_)
        | Expression::Local(_)
        | Expression::UnresolvedIdent(_)
        | Expression::Literal(_)) => leaf,
    }
}

fn map_children<M: TreeMapper + ?Sized>(
    mapper: &mut M,
    children: Vec<Expression>,
) -> Vec<Expression> {
    children
        .into_iter()
        .map(|child| map_expression(mapper, child))
        .collect()
}
