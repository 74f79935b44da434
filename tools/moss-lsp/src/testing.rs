//! Test support: a line-oriented outline indexer standing in for the
//! external parser.

use crate::protocol::{FileUpdate, WorkspaceEditParams};
use moss_ir::{build, names, Expression, Loc, Name, NameTable};
use moss_pipeline::{File, IndexedSource, Indexer};

/// Indexes a little outline notation, one item per line:
///
/// ```text
/// class A          # open a class (closed by `end`)
///   def foo        # instance method
///   def self.bar   # static method
///   sig            # signature annotation send
///   call log       # a call site (feeds only the usage fingerprint)
/// end
/// syntax-error     # anywhere: the file fails to parse
/// ```
///
/// Definitions shape the hierarchy hash; `call` lines do not — exactly the
/// split the fast-path decision relies on.
pub(crate) struct OutlineIndexer {
    names: NameTable,
}

impl OutlineIndexer {
    pub(crate) fn new() -> Self {
        OutlineIndexer {
            names: NameTable::new(),
        }
    }
}

impl Indexer for OutlineIndexer {
    fn index(&self, file: &File) -> IndexedSource {
        let mut parse_failed = false;
        let mut open_classes: Vec<(Name, Vec<Expression>)> = Vec::new();
        let mut top: Vec<Expression> = Vec::new();

        fn push(
            open_classes: &mut Vec<(Name, Vec<Expression>)>,
            top: &mut Vec<Expression>,
            expr: Expression,
        ) {
            match open_classes.last_mut() {
                Some((_, rhs)) => rhs.push(expr),
                None => top.push(expr),
            }
        }

        for raw in file.source.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line == "syntax-error" {
                parse_failed = true;
            } else if let Some(name) = line.strip_prefix("class ") {
                open_classes.push((self.names.intern(name.trim()), Vec::new()));
            } else if line == "end" {
                match open_classes.pop() {
                    Some((name, rhs)) => {
                        let class_expr = build::class_def(
                            Loc::NONE,
                            build::constant(Loc::NONE, name),
                            vec![],
                            rhs,
                        );
                        push(&mut open_classes, &mut top, class_expr);
                    }
                    None => parse_failed = true,
                }
            } else if let Some(rest) = line.strip_prefix("def self.") {
                let def = build::method_def(
                    Loc::NONE,
                    self.names.intern(rest.trim()),
                    true,
                    vec![],
                    build::empty(Loc::NONE),
                );
                push(&mut open_classes, &mut top, def);
            } else if let Some(rest) = line.strip_prefix("def ") {
                let def = build::method_def(
                    Loc::NONE,
                    self.names.intern(rest.trim()),
                    false,
                    vec![],
                    build::empty(Loc::NONE),
                );
                push(&mut open_classes, &mut top, def);
            } else if line == "sig" {
                push(&mut open_classes, &mut top, build::send0(Loc::NONE, names::SIG));
            } else if let Some(rest) = line.strip_prefix("call ") {
                let call = build::send0(Loc::NONE, self.names.intern(rest.trim()));
                push(&mut open_classes, &mut top, call);
            } else {
                parse_failed = true;
            }
        }
        if !open_classes.is_empty() {
            parse_failed = true;
        }

        let tree = match top.len() {
            0 => build::empty(Loc::NONE),
            1 => top.pop().expect("just checked"),
            _ => {
                let result = top.pop().expect("just checked");
                build::ins_seq(Loc::NONE, top, result)
            }
        };
        IndexedSource { tree, parse_failed }
    }
}

/// Build `moss/workspaceEdit` params from `(path, source)` pairs.
pub(crate) fn edit(epoch: u64, files: &[(&str, &str)]) -> WorkspaceEditParams {
    WorkspaceEditParams {
        epoch,
        merge_count: 0,
        updates: files
            .iter()
            .map(|(path, source)| FileUpdate {
                path: (*path).to_string(),
                source: (*source).to_string(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moss_pipeline::compute_file_hash;

    #[test]
    fn call_lines_do_not_shape_the_hierarchy() {
        let indexer = OutlineIndexer::new();
        let before = compute_file_hash(
            &indexer,
            &File::new("x.ms", "class A\n  def foo\n  call log\nend\n"),
        );
        let after = compute_file_hash(
            &indexer,
            &File::new("x.ms", "class A\n  def foo\n  call warn\nend\n"),
        );
        assert_eq!(
            before.definitions.hierarchy_hash,
            after.definitions.hierarchy_hash
        );

        let reshaped = compute_file_hash(
            &indexer,
            &File::new("x.ms", "class A\n  def foo\n  def extra\nend\n"),
        );
        assert_ne!(
            before.definitions.hierarchy_hash,
            reshaped.definitions.hierarchy_hash
        );
    }

    #[test]
    fn syntax_errors_fail_the_parse() {
        let indexer = OutlineIndexer::new();
        let indexed = indexer.index(&File::new("x.ms", "class A\nsyntax-error\nend\n"));
        assert!(indexed.parse_failed);
        let unclosed = indexer.index(&File::new("x.ms", "class A\n"));
        assert!(unclosed.parse_failed);
    }
}
