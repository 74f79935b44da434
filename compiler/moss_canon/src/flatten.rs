//! Definition flattening.
//!
//! This pass lifts nested method definitions up to their enclosing class, so
//! that once a traversal reaches a non-definition node (anything that is not
//! a `ClassDef` or `MethodDef`) it can stop looking for method definitions.
//! To keep programs meaningful it also moves two kinds of sends: signature
//! annotations (`sig`) and method-visibility modifiers (`private` and
//! friends) whose sole argument is a method definition. It also updates the
//! effective static-ness of lifted definitions based on where they were
//! nested.
//!
//! A file like
//!
//! ```text
//! class A
//!   sig { void }
//!   private def foo
//!     sig { void }
//!     def self.bar; end
//!   end
//! end
//! ```
//!
//! becomes
//!
//! ```text
//! class A
//!   sig { void }
//!   private def foo; end
//!   sig { void }
//!   def bar; end     # no `self.`: at runtime, `bar` defined inside the
//! end                # instance method `foo` is an instance method of A
//! ```
//!
//! Mechanically: the walk keeps, per enclosing class, a queue of moved
//! expressions and a stack of pending frames. Every node that might move (a
//! method definition or a movable send) reserves a queue slot on its
//! pre-visit and records the slot and its static level on the stack; on the
//! post-visit, once its whole subtree has been traversed, the node moves
//! into the reserved slot and an `Empty` takes its place in the tree. When
//! the walk leaves a class, the queue is flushed into the class body.
//!
//! Whether a send moves is decided purely syntactically. Redefining
//! `private` to mean something else would fool this pass, and would break
//! far more than the flattener.

use moss_ir::ast::{ClassDef, Expression, MethodDef, Send};
use moss_ir::treemap::{self, TreeMapper};
use moss_ir::{build, names, Loc};

/// Flatten nested method definitions in `tree`.
///
/// The returned tree contains no `MethodDef` (and no movable send) below any
/// non-definition node. Definitions lifted from outside any class are
/// collected into an `InsSeq` at the root.
pub fn flatten(tree: Expression) -> Expression {
    let mut walk = FlattenWalk::new();
    let tree = treemap::map_expression(&mut walk, tree);
    walk.finish(tree)
}

/// A pending move, tracked while the walk is inside the node's subtree.
struct Frame {
    /// Reserved queue slot, or `None` when the node sits at the top level of
    /// its class and does not need to move.
    slot: Option<usize>,
    /// Effective static level of the definition context this frame opens.
    ///
    /// For `def self.foo; def bar; end; end` the inner `bar` must come out
    /// static as well; the level travels down the stack so `bar` can see
    /// that its context is.
    static_level: u32,
}

struct MovedItem {
    expr: Expression,
    static_level: u32,
}

/// Per-class move state: the queue of moved expressions (slots reserved in
/// pre-order, filled in post-order) and the stack of pending frames.
#[derive(Default)]
struct MethodSet {
    moved: Vec<Option<MovedItem>>,
    stack: Vec<Frame>,
}

struct FlattenWalk {
    /// One entry per enclosing `ClassDef`, plus a synthetic outermost set
    /// for definitions lifted outside any class.
    scopes: Vec<MethodSet>,
}

impl FlattenWalk {
    fn new() -> Self {
        FlattenWalk {
            scopes: vec![MethodSet::default()],
        }
    }

    fn cur(&mut self) -> &mut MethodSet {
        self.scopes.last_mut().expect("scope stack is empty")
    }

    /// Static level for a definition entered now: the level of the innermost
    /// pending frame, plus one for a `self.` qualifier.
    ///
    /// A `self.` qualifier directly under an instance-level definition is
    /// dropped rather than counted: at runtime such a definition attaches to
    /// the instance, and the closest class-level approximation is an
    /// instance method.
    fn compute_static_level(&mut self, is_self: bool) -> u32 {
        let set = self.cur();
        let prev = set.stack.last().map_or(0, |frame| frame.static_level);
        if is_self && (set.stack.is_empty() || prev > 0) {
            prev + 1
        } else {
            prev
        }
    }

    /// Reserve a move slot for a definition entered now.
    ///
    /// Only nested definitions move; at the top level of a class the frame
    /// records no slot and the node stays where it is.
    fn push_frame(&mut self, static_level: u32) {
        let set = self.cur();
        if set.stack.is_empty() {
            set.stack.push(Frame {
                slot: None,
                static_level,
            });
        } else {
            let slot = set.moved.len();
            set.moved.push(None);
            set.stack.push(Frame {
                slot: Some(slot),
                static_level,
            });
        }
    }

    /// Pop the innermost frame and either leave `expr` in place (top-level)
    /// or move it into its reserved slot, leaving `Empty` behind.
    fn claim_or_keep(&mut self, expr: Expression) -> Expression {
        let set = self.cur();
        let frame = set.stack.pop().expect("no pending frame to pop");
        let Some(slot) = frame.slot else {
            return expr;
        };
        assert!(slot < set.moved.len(), "reserved slot out of range");
        assert!(
            set.moved[slot].is_none(),
            "reserved slot filled before its node was claimed"
        );
        let loc = expr.loc();
        set.moved[slot] = Some(MovedItem {
            expr,
            static_level: frame.static_level,
        });
        Expression::Empty(loc)
    }

    fn pop_moved_items(&mut self) -> Vec<MovedItem> {
        let set = self.scopes.pop().expect("scope stack is empty");
        assert!(
            set.stack.is_empty(),
            "pending frames left behind at end of scope"
        );
        set.moved
            .into_iter()
            .enumerate()
            .map(|(slot, item)| item.unwrap_or_else(|| panic!("moved slot {slot} never filled")))
            .collect()
    }

    /// Flush the current method set into a class body.
    fn flush_into_class(&mut self, mut rhs: Vec<Expression>, loc: Loc) -> Vec<Expression> {
        if self.cur().moved.len() == 1 && rhs.len() == 1 && rhs[0].is_empty_node() {
            // It was only 1 method to begin with; put it back.
            let mut items = self.pop_moved_items();
            rhs.clear();
            rhs.push(items.pop().expect("exactly one moved item").expr);
            return rhs;
        }
        let mut items = self.pop_moved_items();

        // A sig was recorded at level 0; rebind it to the level of the
        // definition that follows it so the pair stays adjacent after the
        // per-level partition below.
        let mut highest_level = 0;
        for i in 0..items.len() {
            let level = items[i].static_level;
            if highest_level < level {
                highest_level = level;
            }
            if i > 0 {
                if let Expression::Send(send) = &items[i - 1].expr {
                    if send.method == names::SIG {
                        items[i - 1].static_level = level;
                    }
                }
            }
        }

        // Levels 0 and 1 go into the class itself; level n >= 2 goes into
        // the (n - 1)'th nested singleton-class block.
        let mut nested: Vec<Vec<Expression>> = Vec::new();
        nested.resize_with(highest_level.saturating_sub(1) as usize, Vec::new);

        for item in items {
            let mut expr = item.expr;
            if let Expression::MethodDef(method_def) = &mut expr {
                method_def.flags.is_self = item.static_level > 0;
            }
            match item.static_level {
                0 | 1 => rhs.push(expr),
                level => nested[level as usize - 2].push(expr),
            }
        }

        for body in nested {
            rhs.push(build::singleton_class(loc, body));
        }
        rhs
    }

    /// Flush the outermost method set into the program root.
    ///
    /// Definitions can be lifted outside any class when the walk is applied
    /// to a fragment. They are appended to the root instruction sequence,
    /// wrapping the root if necessary.
    fn flush_into_root(&mut self, tree: Expression) -> Expression {
        if self.cur().moved.is_empty() {
            let items = self.pop_moved_items();
            assert!(items.is_empty());
            return tree;
        }
        if self.cur().moved.len() == 1 && tree.is_empty_node() {
            let mut items = self.pop_moved_items();
            return items.pop().expect("exactly one moved item").expr;
        }

        match tree {
            Expression::InsSeq(mut seq) => {
                for item in self.pop_moved_items() {
                    seq.stats.push(item.expr);
                }
                Expression::InsSeq(seq)
            }
            other => {
                let loc = other.loc();
                self.flush_into_root(build::ins_seq(loc, vec![], other))
            }
        }
    }

    fn finish(mut self, tree: Expression) -> Expression {
        let tree = self.flush_into_root(tree);
        assert!(
            self.scopes.is_empty(),
            "scope stack must drain by end of walk"
        );
        tree
    }
}

/// True for visibility-modifier sends that carry their definition with them:
/// the method name is in the modifier set and the sole argument is a
/// `MethodDef`.
fn is_method_modifier(send: &Send) -> bool {
    names::is_visibility_modifier(send.method)
        && send.args.len() == 1
        && matches!(send.args[0], Expression::MethodDef(_))
}

/// True for sends this pass moves: `sig` annotations and method modifiers.
fn is_movable(send: &Send) -> bool {
    send.method == names::SIG || is_method_modifier(send)
}

impl TreeMapper for FlattenWalk {
    fn pre_class_def(&mut self, _class_def: &mut ClassDef) {
        self.scopes.push(MethodSet::default());
    }

    fn post_class_def(&mut self, mut class_def: ClassDef) -> Expression {
        class_def.rhs = self.flush_into_class(std::mem::take(&mut class_def.rhs), class_def.loc);
        Expression::ClassDef(class_def)
    }

    fn pre_method_def(&mut self, method_def: &mut MethodDef) {
        if method_def.flags.wrapped {
            // The surrounding modifier send owns this definition's move.
            assert!(
                !self.cur().stack.is_empty(),
                "wrapped definition outside a pending modifier send"
            );
            return;
        }
        let static_level = self.compute_static_level(method_def.flags.is_self);
        self.push_frame(static_level);
    }

    fn post_method_def(&mut self, method_def: MethodDef) -> Expression {
        if method_def.flags.wrapped {
            return Expression::MethodDef(method_def);
        }
        self.claim_or_keep(Expression::MethodDef(method_def))
    }

    fn pre_send(&mut self, send: &mut Send) {
        if !is_movable(send) {
            return;
        }
        let mut static_level = 0;
        if is_method_modifier(send) {
            // The modifier carries its definition: mark it so the walk does
            // not reserve a second slot for it, and take the level from it.
            let Expression::MethodDef(method_def) = &mut send.args[0] else {
                unreachable!("is_method_modifier checked the sole argument");
            };
            method_def.flags.wrapped = true;
            static_level = self.compute_static_level(method_def.flags.is_self);
        }
        // A sig gets level 0 here; it is rebound to its method's level when
        // the class flushes.
        self.push_frame(static_level);
    }

    fn post_send(&mut self, mut send: Send) -> Expression {
        if !is_movable(&send) {
            return Expression::Send(send);
        }
        if is_method_modifier(&send) {
            let Expression::MethodDef(method_def) = &mut send.args[0] else {
                unreachable!("is_method_modifier checked the sole argument");
            };
            method_def.flags.wrapped = false;
        }
        self.claim_or_keep(Expression::Send(send))
    }
}
