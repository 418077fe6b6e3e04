// crates/mcpgate-condition/src/lib.rs
// ============================================================================
// Module: Condition Tree
// Description: Generic recursive boolean condition tree shared by the policy
//              engine's raw (wire) and compiled (evaluator) representations.
// Purpose: Provide a single recursive evaluator with explicit depth/size
//          limits so a pathological policy cannot exhaust the stack.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! A condition tree is a tagged recursive type with three cases: a leaf, an
//! `all` (AND) composite, and an `any` (OR) composite. The leaf payload is
//! generic: `mcpgate-core` instantiates it with the raw, JSON-scalar leaf
//! read from storage, and `mcpgate-policy` instantiates it with a compiled
//! leaf carrying a precompiled regex or CIDR set. Evaluation is a single
//! recursive function parameterized by a leaf resolver; there is no
//! inheritance hierarchy.
//!
//! Security posture: condition trees are built from untrusted policy
//! documents. Depth and node-count limits are enforced so a malicious or
//! malformed policy cannot be used to exhaust the stack or CPU budget at
//! evaluation time.

pub mod error;

pub use error::ConditionError;

use serde::Deserialize;
use serde::Serialize;

/// Maximum recursion depth accepted by [`validate`] and [`evaluate`].
pub const MAX_CONDITION_NESTING: usize = 32;

/// Maximum total node count (leaves + composites) accepted by [`validate`].
pub const MAX_CONDITION_NODES: usize = 4096;

/// A recursive boolean condition tree over a generic leaf type `L`.
///
/// # Invariants
/// - `All`/`Any` composites may be empty; an empty `All` evaluates `true`
///   (vacuous AND) and an empty `Any` evaluates `false` (vacuous OR).
/// - The untagged wire representation is `{field,operator,value}` for a leaf
///   (whatever shape `L` serializes to) or `{all:[...]}` / `{any:[...]}` for
///   composites; there is no explicit `kind` discriminant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionTree<L> {
    /// Conjunction: true iff every child is true.
    All {
        /// Child conditions, all of which must hold.
        all: Vec<ConditionTree<L>>,
    },
    /// Disjunction: true iff at least one child is true.
    Any {
        /// Child conditions, at least one of which must hold.
        any: Vec<ConditionTree<L>>,
    },
    /// A leaf condition, opaque to this crate.
    Leaf(L),
}

impl<L> ConditionTree<L> {
    /// Builds a leaf node.
    pub fn leaf(value: L) -> Self {
        Self::Leaf(value)
    }

    /// Builds an `all` composite.
    #[must_use]
    pub fn all(children: Vec<Self>) -> Self {
        Self::All { all: children }
    }

    /// Builds an `any` composite.
    #[must_use]
    pub fn any(children: Vec<Self>) -> Self {
        Self::Any { any: children }
    }

    /// Validates node count and nesting depth without evaluating leaves.
    ///
    /// # Errors
    /// Returns [`ConditionError::NestingTooDeep`] or
    /// [`ConditionError::TooManyNodes`] if the tree exceeds the documented
    /// limits.
    pub fn validate(&self) -> Result<(), ConditionError> {
        let mut nodes = 0usize;
        validate_rec(self, 0, &mut nodes)
    }

    /// Evaluates the tree against a leaf resolver.
    ///
    /// The resolver is invoked once per leaf encountered on the evaluation
    /// path; short-circuiting means not every leaf is necessarily visited.
    ///
    /// # Errors
    /// Propagates depth-limit errors and any error the resolver returns for
    /// an individual leaf; callers that want "evaluator errors never fail
    /// the request" semantics (as the policy engine does) should treat an
    /// `Err` as a non-match rather than propagating it further.
    pub fn evaluate(
        &self,
        resolve: &mut impl FnMut(&L) -> Result<bool, ConditionError>,
    ) -> Result<bool, ConditionError> {
        evaluate_rec(self, resolve, 0)
    }
}

fn validate_rec<L>(
    tree: &ConditionTree<L>,
    depth: usize,
    nodes: &mut usize,
) -> Result<(), ConditionError> {
    if depth > MAX_CONDITION_NESTING {
        return Err(ConditionError::NestingTooDeep {
            limit: MAX_CONDITION_NESTING,
        });
    }
    *nodes += 1;
    if *nodes > MAX_CONDITION_NODES {
        return Err(ConditionError::TooManyNodes {
            limit: MAX_CONDITION_NODES,
        });
    }
    match tree {
        ConditionTree::All { all: children } | ConditionTree::Any { any: children } => {
            for child in children {
                validate_rec(child, depth + 1, nodes)?;
            }
            Ok(())
        }
        ConditionTree::Leaf(_) => Ok(()),
    }
}

fn evaluate_rec<L>(
    tree: &ConditionTree<L>,
    resolve: &mut impl FnMut(&L) -> Result<bool, ConditionError>,
    depth: usize,
) -> Result<bool, ConditionError> {
    if depth > MAX_CONDITION_NESTING {
        return Err(ConditionError::NestingTooDeep {
            limit: MAX_CONDITION_NESTING,
        });
    }
    match tree {
        ConditionTree::All { all: children } => {
            for child in children {
                if !evaluate_rec(child, resolve, depth + 1)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ConditionTree::Any { any: children } => {
            for child in children {
                if evaluate_rec(child, resolve, depth + 1)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        ConditionTree::Leaf(leaf) => resolve(leaf),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Flag(bool);

    fn resolver<'a>(flags: &'a [Flag]) -> impl FnMut(&Flag) -> Result<bool, ConditionError> + 'a {
        move |leaf: &Flag| Ok(flags.contains(leaf) && leaf.0)
    }

    #[test]
    fn empty_all_is_true() {
        let tree: ConditionTree<Flag> = ConditionTree::all(vec![]);
        assert!(tree.evaluate(&mut resolver(&[])).unwrap());
    }

    #[test]
    fn empty_any_is_false() {
        let tree: ConditionTree<Flag> = ConditionTree::any(vec![]);
        assert!(!tree.evaluate(&mut resolver(&[])).unwrap());
    }

    #[test]
    fn nested_all_any() {
        let tree = ConditionTree::all(vec![
            ConditionTree::leaf(Flag(true)),
            ConditionTree::any(vec![ConditionTree::leaf(Flag(false)), ConditionTree::leaf(Flag(true))]),
        ]);
        let flags = [Flag(true), Flag(false)];
        assert!(tree.evaluate(&mut resolver(&flags)).unwrap());
    }

    #[test]
    fn depth_limit_rejected_by_validate() {
        let mut tree = ConditionTree::leaf(Flag(true));
        for _ in 0..(MAX_CONDITION_NESTING + 2) {
            tree = ConditionTree::all(vec![tree]);
        }
        assert!(matches!(
            tree.validate(),
            Err(ConditionError::NestingTooDeep { .. })
        ));
    }

    #[test]
    fn wire_shape_is_untagged() {
        let tree = ConditionTree::all(vec![ConditionTree::leaf(Flag(true))]);
        let json = serde_json::to_value(&tree).unwrap();
        assert!(json.get("all").is_some());
    }
}
