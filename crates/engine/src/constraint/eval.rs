// SPDX-License-Identifier: MIT OR Apache-2.0

//! Constraint evaluation against one target node.
//!
//! Failure policy (mirrored by the local match sweep): a fatal error
//! ([`EvalError::is_fatal`]) aborts the whole query, everything else is
//! absorbed as "this node does not match". Missing optional attributes
//! compare unequal to everything instead of erroring; only structural use
//! of a missing value (arithmetic) raises, and that raise is absorbed.

use super::{Attr, BinOp, Constraint, Expr, Func, Func2, NodeRef, SetQuant, UnOp};
use crate::cache::AttrSource;
use crate::tree::{EvolEvent, Node, NodeId, Tree};

use thiserror::Error;

/// Maps taxon ids to names, injected by the caller.
pub type TaxonNamer = dyn Fn(u64) -> Option<String> + Sync;

/// Run-time evaluation failures.
#[derive(Debug, Error)]
pub enum EvalError {
    /// The clause did not produce a boolean. Fatal to the query.
    #[error("constraint `{0}` did not evaluate to a boolean")]
    NotBoolean(String),
    /// An operation is undefined for the operand types. Fatal to the query.
    #[error("type error in constraint: {0}")]
    Type(String),
    /// A value needed by the expression is absent at this node. Absorbed:
    /// the node simply does not match.
    #[error("attribute unavailable: {0}")]
    Unavailable(String),
}

impl EvalError {
    /// Whether this failure aborts the whole query instead of being
    /// treated as a local non-match.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Unavailable(_))
    }
}

/// A constraint value. `Missing` is the result of reading an optional
/// attribute that is not annotated; it compares unequal to everything.
#[derive(Debug, Clone)]
pub(crate) enum Value {
    Bool(bool),
    Num(f64),
    Str(String),
    List(Vec<Value>),
    Missing,
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Num(_) => "number",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Missing => "missing",
        }
    }
}

/// Variable bindings for one evaluation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Binding {
    pub(crate) this: NodeId,
    pub(crate) set_elem: Option<NodeId>,
    pub(crate) incumbent: Option<NodeId>,
}

impl Binding {
    pub(crate) fn target(this: NodeId) -> Self {
        Self {
            this,
            set_elem: None,
            incumbent: None,
        }
    }

    pub(crate) fn extremal(this: NodeId, incumbent: NodeId) -> Self {
        Self {
            this,
            set_elem: None,
            incumbent: Some(incumbent),
        }
    }
}

/// Everything a constraint may consult about the target tree.
#[derive(Clone, Copy)]
pub(crate) struct EvalCtx<'a, 't> {
    pub(crate) tree: &'t Tree,
    pub(crate) attrs: AttrSource<'a>,
    pub(crate) namer: Option<&'a TaxonNamer>,
}

impl<'a, 't> EvalCtx<'a, 't> {
    /// Evaluates one clause to a boolean.
    pub(crate) fn eval_bool(
        &self,
        constraint: &Constraint,
        binding: Binding,
    ) -> Result<bool, EvalError> {
        match self.eval(&constraint.expr, binding)? {
            Value::Bool(value) => Ok(value),
            _ => Err(EvalError::NotBoolean(constraint.source.clone())),
        }
    }

    fn eval(&self, expr: &Expr, binding: Binding) -> Result<Value, EvalError> {
        match expr {
            Expr::Bool(value) => Ok(Value::Bool(*value)),
            Expr::Num(value) => Ok(Value::Num(*value)),
            Expr::Str(text) => Ok(Value::Str(text.clone())),
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item, binding))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(values))
            }
            Expr::Regex(_) => Err(EvalError::Type("regular expression outside `=~`".into())),
            Expr::Attr(node, attr) => {
                let node = self.resolve(*node, binding)?;
                Ok(self.attr_value(node, *attr))
            }
            Expr::Call(func, node) => {
                let node = self.resolve(*node, binding)?;
                Ok(self.call(*func, node))
            }
            Expr::CallWith(func, node, arg) => {
                let node = self.resolve(*node, binding)?;
                let arg = self.eval(arg, binding)?;
                self.call_with(*func, node, arg)
            }
            Expr::Unary(op, inner) => {
                let value = self.eval(inner, binding)?;
                match (op, value) {
                    (UnOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnOp::Neg, Value::Num(n)) => Ok(Value::Num(-n)),
                    (UnOp::Not, v) => {
                        Err(EvalError::Type(format!("`not` applied to {}", v.type_name())))
                    }
                    (UnOp::Neg, v) => {
                        Err(EvalError::Type(format!("negation applied to {}", v.type_name())))
                    }
                }
            }
            Expr::Binary(op, lhs, rhs) => self.binary(*op, lhs, rhs, binding),
            Expr::Quantified(quant, body) => {
                let this = self.tree.node(binding.this);
                for child in this.children() {
                    let bound = Binding {
                        set_elem: Some(child.id()),
                        ..binding
                    };
                    let value = match self.eval(body, bound)? {
                        Value::Bool(b) => b,
                        _ => {
                            return Err(EvalError::Type(
                                "quantified comparison must be boolean".into(),
                            ));
                        }
                    };
                    match quant {
                        SetQuant::AllChildren if !value => return Ok(Value::Bool(false)),
                        SetQuant::AnyChild if value => return Ok(Value::Bool(true)),
                        _ => {}
                    }
                }
                // vacuous truth for the universal form, falsity for the
                // existential one
                Ok(Value::Bool(matches!(quant, SetQuant::AllChildren)))
            }
        }
    }

    fn binary(
        &self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        binding: Binding,
    ) -> Result<Value, EvalError> {
        // short-circuiting connectives first
        if matches!(op, BinOp::And | BinOp::Or) {
            let left = self.eval_as_bool(lhs, binding)?;
            return match (op, left) {
                (BinOp::And, false) => Ok(Value::Bool(false)),
                (BinOp::Or, true) => Ok(Value::Bool(true)),
                _ => Ok(Value::Bool(self.eval_as_bool(rhs, binding)?)),
            };
        }
        if op == BinOp::Match {
            let Expr::Regex(regex) = rhs else {
                return Err(EvalError::Type("malformed `=~`".into()));
            };
            return match self.eval(lhs, binding)? {
                Value::Str(text) => Ok(Value::Bool(regex.is_match(&text))),
                Value::Missing => Ok(Value::Bool(false)),
                other => Err(EvalError::Type(format!(
                    "`=~` applied to {}",
                    other.type_name()
                ))),
            };
        }
        let left = self.eval(lhs, binding)?;
        let right = self.eval(rhs, binding)?;
        match op {
            BinOp::Eq => Ok(Value::Bool(self.value_eq(&left, &right))),
            BinOp::Ne => Ok(Value::Bool(!self.value_eq(&left, &right))),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => self.compare(op, &left, &right),
            BinOp::In => Ok(Value::Bool(self.membership(&left, &right)?)),
            BinOp::NotIn => Ok(Value::Bool(!self.membership(&left, &right)?)),
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
                self.arithmetic(op, &left, &right)
            }
            BinOp::And | BinOp::Or | BinOp::Match => unreachable!("handled above"),
        }
    }

    fn eval_as_bool(&self, expr: &Expr, binding: Binding) -> Result<bool, EvalError> {
        match self.eval(expr, binding)? {
            Value::Bool(value) => Ok(value),
            other => Err(EvalError::Type(format!(
                "connective applied to {}",
                other.type_name()
            ))),
        }
    }

    /// Equality across mismatched types is `false`, and `Missing` equals
    /// nothing, not even itself.
    fn value_eq(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Num(x), Value::Num(y)) => x == y,
            (Value::Str(x), Value::Str(y)) => x == y,
            (Value::List(x), Value::List(y)) => {
                x.len() == y.len() && x.iter().zip(y).all(|(a, b)| self.value_eq(a, b))
            }
            _ => false,
        }
    }

    fn compare(&self, op: BinOp, a: &Value, b: &Value) -> Result<Value, EvalError> {
        use std::cmp::Ordering;
        let ordering = match (a, b) {
            (Value::Missing, _) | (_, Value::Missing) => return Ok(Value::Bool(false)),
            (Value::Num(x), Value::Num(y)) => x.partial_cmp(y),
            (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
            _ => {
                return Err(EvalError::Type(format!(
                    "cannot order {} and {}",
                    a.type_name(),
                    b.type_name()
                )));
            }
        };
        let Some(ordering) = ordering else {
            // NaN comparisons are simply false
            return Ok(Value::Bool(false));
        };
        let result = match op {
            BinOp::Lt => ordering == Ordering::Less,
            BinOp::Le => ordering != Ordering::Greater,
            BinOp::Gt => ordering == Ordering::Greater,
            BinOp::Ge => ordering != Ordering::Less,
            _ => unreachable!("compare called with ordering op"),
        };
        Ok(Value::Bool(result))
    }

    fn membership(&self, item: &Value, container: &Value) -> Result<bool, EvalError> {
        match container {
            Value::List(items) => Ok(items.iter().any(|elem| self.member_eq(item, elem))),
            Value::Str(text) => match item {
                Value::Str(needle) => Ok(text.contains(needle.as_str())),
                Value::Missing => Ok(false),
                other => Err(EvalError::Type(format!(
                    "{} tested for membership in a string",
                    other.type_name()
                ))),
            },
            Value::Missing => Ok(false),
            other => Err(EvalError::Type(format!(
                "`in` applied to {}",
                other.type_name()
            ))),
        }
    }

    /// List membership, with the lineage convenience: a string tested
    /// against numeric taxon ids goes through the injected naming function.
    fn member_eq(&self, item: &Value, elem: &Value) -> bool {
        if self.value_eq(item, elem) {
            return true;
        }
        if let (Value::Str(name), Value::Num(id), Some(namer)) = (item, elem, self.namer) {
            if id.fract() == 0.0 && *id >= 0.0 {
                return namer(*id as u64).is_some_and(|mapped| mapped == *name);
            }
        }
        false
    }

    fn arithmetic(&self, op: BinOp, a: &Value, b: &Value) -> Result<Value, EvalError> {
        match (a, b) {
            (Value::Num(x), Value::Num(y)) => {
                let value = match op {
                    BinOp::Add => x + y,
                    BinOp::Sub => x - y,
                    BinOp::Mul => x * y,
                    BinOp::Div => x / y,
                    _ => unreachable!("arithmetic called with arithmetic op"),
                };
                Ok(Value::Num(value))
            }
            (Value::Missing, _) | (_, Value::Missing) => Err(EvalError::Unavailable(
                "arithmetic on a missing attribute".into(),
            )),
            _ => Err(EvalError::Type(format!(
                "arithmetic on {} and {}",
                a.type_name(),
                b.type_name()
            ))),
        }
    }

    fn resolve(&self, node: NodeRef, binding: Binding) -> Result<NodeId, EvalError> {
        match node {
            NodeRef::This => Ok(binding.this),
            NodeRef::SetElem => binding
                .set_elem
                .ok_or_else(|| EvalError::Unavailable("set reference outside quantifier".into())),
            NodeRef::Incumbent => binding
                .incumbent
                .ok_or_else(|| EvalError::Unavailable("no extremal incumbent bound".into())),
            NodeRef::Child(index) => self
                .tree
                .node(binding.this)
                .child(index)
                .map(|child| child.id())
                .ok_or_else(|| EvalError::Unavailable(format!("child index {index} out of range"))),
        }
    }

    fn attr_value(&self, id: NodeId, attr: Attr) -> Value {
        let node = self.tree.node(id);
        match attr {
            Attr::Name => Value::Str(node.name().to_owned()),
            Attr::Dist => Value::Num(node.dist()),
            Attr::Support => Value::Num(node.support()),
            Attr::Species => node
                .species()
                .map_or(Value::Missing, |s| Value::Str(s.to_owned())),
            Attr::Lineage => Value::List(
                node.lineage()
                    .iter()
                    .map(|&id| Value::Num(id as f64))
                    .collect(),
            ),
            Attr::NamedLineage => {
                let Some(namer) = self.namer else {
                    return Value::List(Vec::new());
                };
                Value::List(
                    node.lineage()
                        .iter()
                        .filter_map(|&id| namer(id))
                        .map(Value::Str)
                        .collect(),
                )
            }
            Attr::Evoltype => node
                .evoltype()
                .map_or(Value::Missing, |e| Value::Str(e.code().to_owned())),
        }
    }

    fn call(&self, func: Func, id: NodeId) -> Value {
        let node = self.tree.node(id);
        match func {
            Func::IsLeaf => Value::Bool(node.is_leaf()),
            Func::IsRoot => Value::Bool(node.is_root()),
            Func::Leaves => Value::List(sorted_strings(self.leaf_names(node))),
            Func::Descendants => {
                let names = strings(self.aggregate(node, Attr::Name, false));
                Value::List(sorted_strings(names))
            }
            Func::Species => Value::List(sorted_dedup_strings(self.leaf_species(node))),
            Func::NSpecies => {
                let mut species = self.leaf_species(node);
                species.sort_unstable();
                species.dedup();
                Value::Num(species.len() as f64)
            }
            Func::NLeaves => Value::Num(self.attrs.leaf_ids(node).len() as f64),
            Func::NDuplications => Value::Num(self.count_events(node, EvolEvent::Duplication)),
            Func::NSpeciations => Value::Num(self.count_events(node, EvolEvent::Speciation)),
        }
    }

    fn call_with(&self, func: Func2, id: NodeId, arg: Value) -> Result<Value, EvalError> {
        let node = self.tree.node(id);
        let wanted = string_set(arg)?;
        let have: Vec<String> = match func {
            Func2::ContainsSpecies => self.leaf_species(node),
            Func2::ContainsLeaves => self.leaf_names(node),
        };
        let all_present = wanted.iter().all(|name| have.iter().any(|h| h == name));
        Ok(Value::Bool(all_present))
    }

    /// Attribute values over the leaves or the whole subtree of `node`, in
    /// ascending node-id order. Unannotated optional attributes come out
    /// as `Missing` entries.
    fn aggregate(&self, node: Node<'t>, attr: Attr, leaves_only: bool) -> Vec<Value> {
        let ids = if leaves_only {
            self.attrs.leaf_ids(node)
        } else {
            self.attrs.subtree_ids(node)
        };
        ids.into_iter()
            .map(|id| self.attr_value(id, attr))
            .collect()
    }

    fn leaf_names(&self, node: Node<'t>) -> Vec<String> {
        strings(self.aggregate(node, Attr::Name, true))
    }

    fn leaf_species(&self, node: Node<'t>) -> Vec<String> {
        strings(self.aggregate(node, Attr::Species, true))
    }

    fn count_events(&self, node: Node<'t>, event: EvolEvent) -> f64 {
        self.aggregate(node, Attr::Evoltype, false)
            .into_iter()
            .filter(|value| matches!(value, Value::Str(code) if code == event.code()))
            .count() as f64
    }
}

// keeps the present string values, skipping `Missing` entries
fn strings(values: Vec<Value>) -> Vec<String> {
    values
        .into_iter()
        .filter_map(|value| match value {
            Value::Str(text) => Some(text),
            _ => None,
        })
        .collect()
}

fn sorted_strings(mut names: Vec<String>) -> Vec<Value> {
    names.sort_unstable();
    names.into_iter().map(Value::Str).collect()
}

fn sorted_dedup_strings(mut names: Vec<String>) -> Vec<Value> {
    names.sort_unstable();
    names.dedup();
    names.into_iter().map(Value::Str).collect()
}

fn string_set(value: Value) -> Result<Vec<String>, EvalError> {
    match value {
        Value::Str(name) => Ok(vec![name]),
        Value::List(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Str(name) => Ok(name),
                other => Err(EvalError::Type(format!(
                    "expected a name, found {}",
                    other.type_name()
                ))),
            })
            .collect(),
        other => Err(EvalError::Type(format!(
            "expected names, found {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod test {
    use super::super::Constraint;
    use super::*;
    use crate::tree::Traversal;

    fn ctx<'a, 't>(tree: &'t Tree) -> EvalCtx<'a, 't> {
        EvalCtx {
            tree,
            attrs: AttrSource::Direct,
            namer: None,
        }
    }

    fn eval_at(tree: &Tree, name: &str, constraint: &str) -> Result<bool, EvalError> {
        let node = tree
            .traverse(Traversal::Preorder)
            .find(|n| n.name() == name)
            .expect("should exist");
        let compiled = Constraint::compile(constraint).expect("should compile");
        ctx(tree).eval_bool(&compiled, Binding::target(node.id()))
    }

    #[test]
    fn test_attribute_comparisons() {
        let tree = Tree::from_newick("((c:0.5,g:2)a);").expect("should parse");
        assert!(eval_at(&tree, "c", "@.dist == 0.5").expect("should eval"));
        assert!(eval_at(&tree, "g", "@.dist > 1").expect("should eval"));
        assert!(eval_at(&tree, "a", "@.dist == 1").expect("should eval"));
        assert!(eval_at(&tree, "c", "@.name == \"c\"").expect("should eval"));
        assert!(eval_at(&tree, "c", "@.is_leaf()").expect("should eval"));
        assert!(!eval_at(&tree, "c", "@.is_root()").expect("should eval"));
    }

    #[test]
    fn test_boolean_connectives() {
        let tree = Tree::from_newick("((c:0.5,g:2)a);").expect("should parse");
        assert!(eval_at(&tree, "c", "@.name == \"c\" and @.dist < 1").expect("should eval"));
        assert!(eval_at(&tree, "c", "@.name == \"x\" or @.dist < 1").expect("should eval"));
        assert!(eval_at(&tree, "c", "not @.dist > 1").expect("should eval"));
    }

    #[test]
    fn test_missing_species_compares_false() {
        let tree = Tree::from_newick("((c,g)a);").expect("should parse");
        assert!(!eval_at(&tree, "c", "@.species == \"Homo\"").expect("should eval"));
        assert!(eval_at(&tree, "c", "@.species != \"Homo\"").expect("should eval"));
        assert!(!eval_at(&tree, "c", "@.species < \"Homo\"").expect("should eval"));
    }

    #[test]
    fn test_arithmetic_on_missing_is_absorbed() {
        let tree = Tree::from_newick("((c,g)a);").expect("should parse");
        let err = eval_at(&tree, "c", "@.species + 1 == 2").expect_err("should fail");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_type_errors_are_fatal() {
        let tree = Tree::from_newick("((c,g)a);").expect("should parse");
        let err = eval_at(&tree, "c", "@.name > 1").expect_err("should fail");
        assert!(err.is_fatal());
        let err = eval_at(&tree, "c", "@.dist + 1").expect_err("should fail");
        assert!(matches!(err, EvalError::NotBoolean(_)));
    }

    #[test]
    fn test_arithmetic() {
        let tree = Tree::from_newick("((c:0.5,g:2)a);").expect("should parse");
        assert!(eval_at(&tree, "g", "@.dist + 1 == 3").expect("should eval"));
        assert!(eval_at(&tree, "g", "@.dist * 2 - 1 == 3").expect("should eval"));
        assert!(eval_at(&tree, "g", "-@.dist < 0").expect("should eval"));
    }

    #[test]
    fn test_lineage_membership() {
        let mut tree = Tree::from_newick("((c,g)a);").expect("should parse");
        let c = tree
            .traverse(Traversal::Preorder)
            .find(|n| n.name() == "c")
            .expect("should exist")
            .id();
        tree.set_lineage(c, vec![1, 9443, 9606]);
        assert!(eval_at(&tree, "c", "9443 in @.lineage").expect("should eval"));
        assert!(!eval_at(&tree, "c", "7227 in @.lineage").expect("should eval"));
        assert!(eval_at(&tree, "c", "7227 not in @.lineage").expect("should eval"));
    }

    #[test]
    fn test_lineage_naming() {
        let mut tree = Tree::from_newick("((c,g)a);").expect("should parse");
        let c = tree
            .traverse(Traversal::Preorder)
            .find(|n| n.name() == "c")
            .expect("should exist")
            .id();
        tree.set_lineage(c, vec![9443, 9606]);
        let namer = |id: u64| match id {
            9443 => Some("Primates".to_owned()),
            9606 => Some("Homo sapiens".to_owned()),
            _ => None,
        };
        let compiled = Constraint::compile("\"Primates\" in @.lineage").expect("should compile");
        let context = EvalCtx {
            tree: &tree,
            attrs: AttrSource::Direct,
            namer: Some(&namer),
        };
        assert!(context
            .eval_bool(&compiled, Binding::target(c))
            .expect("should eval"));
        let compiled =
            Constraint::compile("\"Primates\" in @.named_lineage").expect("should compile");
        assert!(context
            .eval_bool(&compiled, Binding::target(c))
            .expect("should eval"));
        // without a namer the string form finds nothing
        assert!(!eval_at(&tree, "c", "\"Primates\" in @.lineage").expect("should eval"));
    }

    #[test]
    fn test_shortcut_predicates() {
        let mut tree =
            Tree::from_newick("((Homo_1,(Pan_1,Pan_2)p)x,Rattus_1)r;").expect("should parse");
        tree.infer_species_from_prefix();
        assert!(eval_at(&tree, "x", "n_leaves(@) == 3").expect("should eval"));
        assert!(eval_at(&tree, "x", "n_species(@) == 2").expect("should eval"));
        assert!(eval_at(&tree, "x", "contains_species(@, \"Pan\")").expect("should eval"));
        assert!(
            eval_at(&tree, "x", "contains_species(@, [\"Pan\", \"Homo\"])").expect("should eval")
        );
        assert!(!eval_at(&tree, "x", "contains_species(@, \"Rattus\")").expect("should eval"));
        assert!(
            eval_at(&tree, "x", "contains_leaves(@, [\"Pan_1\", \"Pan_2\"])").expect("should eval")
        );
        assert!(eval_at(&tree, "x", "\"Homo_1\" in leaves(@)").expect("should eval"));
        assert!(eval_at(&tree, "x", "\"p\" in descendants(@)").expect("should eval"));
    }

    #[test]
    fn test_event_counts() {
        let mut tree = Tree::from_newick("((a,b)d1,(c,e)s1)d2;").expect("should parse");
        for name in ["d1", "d2"] {
            let id = tree
                .traverse(Traversal::Preorder)
                .find(|n| n.name() == name)
                .expect("should exist")
                .id();
            tree.set_evoltype(id, EvolEvent::Duplication);
        }
        let s1 = tree
            .traverse(Traversal::Preorder)
            .find(|n| n.name() == "s1")
            .expect("should exist")
            .id();
        tree.set_evoltype(s1, EvolEvent::Speciation);
        assert!(eval_at(&tree, "d2", "n_duplications(@) == 2").expect("should eval"));
        assert!(eval_at(&tree, "d2", "n_speciations(@) == 1").expect("should eval"));
        assert!(eval_at(&tree, "d1", "n_duplications(@) == 1").expect("should eval"));
        assert!(eval_at(&tree, "s1", "@.evoltype == \"S\"").expect("should eval"));
    }

    #[test]
    fn test_quantifiers() {
        let tree = Tree::from_newick("((c:2,g:3)a:1);").expect("should parse");
        assert!(eval_at(&tree, "a", "@.dist < [:children:].dist").expect("should eval"));
        assert!(!eval_at(&tree, "a", "@.dist > [:any_child:].dist").expect("should eval"));
        assert!(eval_at(&tree, "a", "@.dist * 3 > [:any_child:].dist").expect("should eval"));
        // vacuous truth on leaves for the universal form, falsity for the
        // existential one
        assert!(eval_at(&tree, "c", "@.dist < [:children:].dist").expect("should eval"));
        assert!(!eval_at(&tree, "c", "@.dist < [:any_child:].dist").expect("should eval"));
    }

    #[test]
    fn test_extremal_binding() {
        let tree = Tree::from_newick("((c:2,g:3)a:1);").expect("should parse");
        let compiled = Constraint::compile("@.dist > [:all_nodes:].dist").expect("should compile");
        assert!(compiled.extremal);
        let by_name = |name: &str| {
            tree.traverse(Traversal::Preorder)
                .find(|n| n.name() == name)
                .expect("should exist")
                .id()
        };
        let context = ctx(&tree);
        assert!(context
            .eval_bool(&compiled, Binding::extremal(by_name("g"), by_name("c")))
            .expect("should eval"));
        assert!(!context
            .eval_bool(&compiled, Binding::extremal(by_name("c"), by_name("g")))
            .expect("should eval"));
    }

    #[test]
    fn test_child_index() {
        let tree = Tree::from_newick("((c,g)a);").expect("should parse");
        assert!(eval_at(&tree, "a", "@.children[0].name == \"c\"").expect("should eval"));
        assert!(eval_at(&tree, "a", "@.children[1].name == \"g\"").expect("should eval"));
        let err = eval_at(&tree, "a", "@.children[5].name == \"x\"").expect_err("should fail");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_regex_match() {
        let tree = Tree::from_newick("((Ptr01,Pts02)a);").expect("should parse");
        assert!(eval_at(&tree, "Ptr01", "@.name =~ \"^Pt.\"").expect("should eval"));
        assert!(!eval_at(&tree, "a", "@.name =~ \"^Pt.\"").expect("should eval"));
    }

    #[test]
    fn test_string_membership() {
        let tree = Tree::from_newick("((Homo_sapiens_1,g)a);").expect("should parse");
        assert!(eval_at(&tree, "Homo_sapiens_1", "\"sapiens\" in @.name").expect("should eval"));
        assert!(!eval_at(&tree, "g", "\"sapiens\" in @.name").expect("should eval"));
    }
}
